//! voxmerge-core: Score reduction and augmentation for multipart datasets

pub mod attributes;
pub mod config;
mod error;
pub mod filter;
pub mod partition;
pub mod pipeline;
pub mod quantize;
pub mod score;
pub mod separate;
pub mod slice;
mod time;
pub mod transpose;

pub use attributes::AttributeConversion;
pub use config::{AugmentConfig, AugmentSettings, DEFAULT_TARGET_FOLDER};
pub use error::{Result, VoxmergeError};
pub use filter::remove_sparse_parts;
pub use partition::{
    enumerate_partitions, retained_count, sample_candidates, sampled_partition_count,
    sampled_partitions, stirling2, SampledPartitions, VoiceDistribution, VoicePartition,
};
pub use pipeline::{augment, AugmentationPlan, Branch, Variant};
pub use quantize::{quantize, Denominator};
pub use score::{Clef, Event, Instrument, Part, Score, TimeSignature, DEFAULT_PPQ, DEFAULT_TEMPO};
pub use separate::separate_voices;
pub use slice::split_score;
pub use time::Time;
pub use transpose::{transpose, NoteName, TranspositionInterval};
