//! Audio files handed to the pipeline

use crate::error::CoordResult;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum AudioSource {
    Memory(Arc<Vec<u8>>),
    Disk(PathBuf),
}

/// An uploaded audio file
///
/// Size and name are known up front so validation never reads the content.
#[derive(Debug, Clone)]
pub struct AudioFile {
    pub name: String,
    pub size_bytes: u64,
    pub content_type: Option<String>,
    source: AudioSource,
}

impl AudioFile {
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let bytes = bytes.into();
        Self {
            content_type: content_type_for(&name).map(str::to_string),
            size_bytes: bytes.len() as u64,
            name,
            source: AudioSource::Memory(Arc::new(bytes)),
        }
    }

    /// Reference a file on disk; only its metadata is read here
    pub async fn from_path(path: impl AsRef<Path>) -> CoordResult<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(cadash_common::Error::from)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            content_type: content_type_for(&name).map(str::to_string),
            size_bytes: metadata.len(),
            name,
            source: AudioSource::Disk(path.to_path_buf()),
        })
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// On-disk location, if the file was not supplied in memory
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            AudioSource::Disk(path) => Some(path),
            AudioSource::Memory(_) => None,
        }
    }

    /// Load the full content
    pub async fn read(&self) -> CoordResult<Vec<u8>> {
        match &self.source {
            AudioSource::Memory(bytes) => Ok(bytes.as_ref().clone()),
            AudioSource::Disk(path) => Ok(tokio::fs::read(path)
                .await
                .map_err(cadash_common::Error::from)?),
        }
    }
}

fn content_type_for(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "mp3" => Some("audio/mpeg"),
        "wav" => Some("audio/wav"),
        "m4a" => Some("audio/mp4"),
        "ogg" | "oga" => Some("audio/ogg"),
        "flac" => Some("audio/flac"),
        "webm" => Some("audio/webm"),
        _ => None,
    }
}
