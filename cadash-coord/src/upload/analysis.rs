//! Text analysis applied to transcripts before they are saved

use crate::models::TranscriptSegment;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Size-based estimate when segments carry no timing (128 kbit/s)
pub const ESTIMATED_BYTES_PER_SECOND: f64 = 16_000.0;

const MIN_KEYWORD_LEN: usize = 3;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "have", "him", "his", "how", "its", "may", "new", "now", "old",
    "see", "two", "way", "who", "did", "get", "got", "let", "say", "she", "too", "use", "that",
    "this", "with", "from", "they", "will", "would", "there", "their", "what", "about", "which",
    "when", "make", "like", "just", "know", "take", "into", "your", "some", "could", "them",
    "than", "then", "look", "only", "come", "over", "also", "back", "well", "even", "want",
    "because", "these", "give", "most", "yeah", "okay", "been", "were", "here", "very", "going",
    "dont", "right", "really", "thing", "think", "sure", "said", "does", "yes",
];

const POSITIVE_WORDS: &[&str] = &[
    "thanks", "thank", "great", "good", "excellent", "happy", "helpful", "appreciate",
    "perfect", "resolved", "wonderful", "pleased", "love", "awesome", "satisfied", "glad",
    "fantastic", "easy", "fixed",
];

const NEGATIVE_WORDS: &[&str] = &[
    "angry", "bad", "terrible", "problem", "issue", "refund", "cancel", "frustrated",
    "disappointed", "broken", "complaint", "wrong", "awful", "unhappy", "worst", "annoyed",
    "upset", "error", "failed", "waiting",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptAnalysis {
    pub keywords: Vec<String>,
    pub sentiment: Sentiment,
    /// 0-100, 50 when no sentiment-bearing words were found
    pub call_score: i32,
}

pub fn analyze(text: &str, max_keywords: usize) -> TranscriptAnalysis {
    let (sentiment, call_score) = score_sentiment(text);
    TranscriptAnalysis {
        keywords: extract_keywords(text, max_keywords),
        sentiment,
        call_score,
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.replace('\'', "").to_lowercase())
        .filter(|w| !w.is_empty())
}

/// Most frequent non-stop-words, ties broken by first appearance
pub fn extract_keywords(text: &str, max: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (position, word) in words(text).enumerate() {
        if word.len() < MIN_KEYWORD_LEN
            || word.chars().all(|c| c.is_ascii_digit())
            || STOP_WORDS.contains(&word.as_str())
        {
            continue;
        }
        counts.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.into_iter().take(max).map(|(word, _, _)| word).collect()
}

/// Lexicon sentiment label and 0-100 call score
pub fn score_sentiment(text: &str) -> (Sentiment, i32) {
    let (mut positive, mut negative) = (0i32, 0i32);
    for word in words(text) {
        if POSITIVE_WORDS.contains(&word.as_str()) {
            positive += 1;
        } else if NEGATIVE_WORDS.contains(&word.as_str()) {
            negative += 1;
        }
    }

    let hits = positive + negative;
    if hits == 0 {
        return (Sentiment::Neutral, 50);
    }
    let balance = f64::from(positive - negative) / f64::from(hits);
    let score = (50.0 + 50.0 * balance).round().clamp(0.0, 100.0) as i32;
    let label = if balance > 0.2 {
        Sentiment::Positive
    } else if balance < -0.2 {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    };
    (label, score)
}

/// Audio length from segment timing, else estimated from file size
pub fn audio_duration_secs(segments: &[TranscriptSegment], size_bytes: u64) -> f64 {
    let from_segments = segments.iter().map(|s| s.end).fold(0.0_f64, f64::max);
    if from_segments > 0.0 {
        return from_segments;
    }
    (size_bytes as f64 / ESTIMATED_BYTES_PER_SECOND).round()
}
