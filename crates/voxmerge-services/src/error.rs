//! Error types for voxmerge services

use thiserror::Error;
use voxmerge_core::VoxmergeError;

use crate::codec::CodecError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Augment(#[from] VoxmergeError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl ServiceError {
    /// True when the input itself could not be read or decoded
    pub fn is_codec(&self) -> bool {
        matches!(self, Self::Codec(_))
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
