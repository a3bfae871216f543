//! Error types for voxmerge

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VoxmergeError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Degenerate score: part ratio {ratio} removes all {parts} part(s)")]
    DegenerateScore { parts: usize, ratio: f64 },
    #[error("Invalid voice count: cannot reduce {parts} part(s) to {voices} voice(s)")]
    InvalidVoiceCount { voices: usize, parts: usize },
}

pub type Result<T> = std::result::Result<T, VoxmergeError>;
