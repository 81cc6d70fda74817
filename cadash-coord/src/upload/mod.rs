//! Bulk upload processing: one file at a time, transcribed and saved

pub mod analysis;
pub mod dispatch;
pub mod file;
pub mod job;
pub mod pipeline;
pub mod transcriber;
pub mod trends;

pub use dispatch::ThrottledDispatcher;
pub use file::AudioFile;
pub use job::{StatusUpdate, UploadJob, UploadStatus};
pub use pipeline::UploadPipeline;
pub use transcriber::{TranscriptionEngine, TranscriptionResult};
pub use trends::TrendUpdater;
