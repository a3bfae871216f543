//! voxmerge-services: MIDI codec, input discovery and batch processing

pub mod batch;
pub mod codec;
pub mod discovery;
mod error;

pub use batch::{BatchRunner, BatchSummary, FileReport};
pub use codec::{decode, encode, read_score, write_score, CodecError};
pub use discovery::{discover_inputs, is_midi_path, SkippedInput};
pub use error::{Result, ServiceError};
