//! Augmentation pipeline: filter, then transpose x quantize x partition

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AugmentSettings;
use crate::error::Result;
use crate::filter::remove_sparse_parts;
use crate::partition::{sampled_partition_count, stirling2, SampledPartitions, VoicePartition};
use crate::quantize::{quantize, Denominator};
use crate::score::Score;
use crate::transpose::transpose;

/// Plans beyond this many variants are logged as a warning
const LARGE_PLAN: u128 = 100_000;

/// One point of the cross product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub offset: i32,
    pub denominator: Denominator,
    pub partition: VoicePartition,
}

impl Branch {
    /// File name suffix encoding offset, grid and partition, e.g. `t+0-q4-p0.1_2`
    pub fn suffix(&self) -> String {
        format!("t{:+}-q{}-p{}", self.offset, self.denominator.get(), self.partition.id())
    }
}

/// A generated score together with the branch that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub branch: Branch,
    pub score: Score,
}

/// Everything needed to produce the variants of one input score.
///
/// Partitions are regenerated on demand instead of stored, so memory stays
/// flat however many groupings the distribution keeps.
#[derive(Debug, Clone)]
pub struct AugmentationPlan<'a> {
    settings: &'a AugmentSettings,
    filtered: Score,
    partition_count: u128,
}

impl<'a> AugmentationPlan<'a> {
    /// Filter sparse parts and count the voice partitions.
    ///
    /// Fails with `DegenerateScore` when filtering leaves nothing and with
    /// `InvalidVoiceCount` when fewer parts remain than voices requested.
    pub fn new(score: &Score, settings: &'a AugmentSettings) -> Result<Self> {
        let filtered = remove_sparse_parts(score, settings.part_ratio)?;
        let parts = filtered.parts.len();
        let partition_count = sampled_partition_count(parts, &settings.distribution)?;
        info!(
            "Partitioning {} part(s) into {} voice(s): {} of {} grouping(s) kept",
            parts,
            settings.voice_num(),
            partition_count,
            stirling2(parts, settings.voice_num())
        );
        let plan = Self {
            settings,
            filtered,
            partition_count,
        };
        let variants = plan.variant_count();
        if variants > LARGE_PLAN {
            warn!("Plan emits {variants} variant(s); lower voice_distribution to shrink it");
        }
        Ok(plan)
    }

    pub fn filtered(&self) -> &Score {
        &self.filtered
    }

    /// The kept partitions in canonical order, generated afresh on each call
    pub fn partitions(&self) -> SampledPartitions {
        SampledPartitions::new(self.filtered.parts.len(), &self.settings.distribution)
    }

    pub fn partition_count(&self) -> u128 {
        self.partition_count
    }

    /// Total number of variants this plan produces, saturating at `u128::MAX`
    pub fn variant_count(&self) -> u128 {
        (self.settings.branch_factor() as u128).saturating_mul(self.partition_count)
    }

    /// Branches in emission order: offset ascending, then denominators as
    /// configured, then partitions in canonical order.
    pub fn branches(&self) -> impl Iterator<Item = Branch> + '_ {
        self.settings.interval.offsets().flat_map(move |offset| {
            self.settings.quantization.iter().flat_map(move |denominator| {
                self.partitions().map(move |partition| Branch {
                    offset,
                    denominator: *denominator,
                    partition,
                })
            })
        })
    }

    /// Produce the score for a single branch
    pub fn render(&self, branch: &Branch) -> Score {
        let transposed = transpose(&self.filtered, branch.offset);
        let quantized = quantize(&transposed, branch.denominator);
        self.finish(&quantized, &branch.partition)
    }

    fn finish(&self, quantized: &Score, partition: &VoicePartition) -> Score {
        self.settings.conversion.apply(&partition.merge(quantized))
    }

    /// Stream every variant to `sink` in emission order, stopping at the
    /// first error it returns. Shared stages are computed once per offset
    /// and grid rather than once per branch.
    pub fn try_for_each<E, F>(&self, mut sink: F) -> std::result::Result<(), E>
    where
        F: FnMut(Variant) -> std::result::Result<(), E>,
    {
        for offset in self.settings.interval.offsets() {
            let transposed = transpose(&self.filtered, offset);
            for denominator in &self.settings.quantization {
                let quantized = quantize(&transposed, *denominator);
                debug!(
                    "Offset {:+}, grid 1/{}: {} note(s) left",
                    offset,
                    denominator.get(),
                    quantized.event_count()
                );
                for partition in self.partitions() {
                    let score = self.finish(&quantized, &partition);
                    let branch = Branch {
                        offset,
                        denominator: *denominator,
                        partition,
                    };
                    sink(Variant { branch, score })?;
                }
            }
        }
        Ok(())
    }

    /// Collect every variant in memory
    pub fn variants(&self) -> Vec<Variant> {
        let mut out = Vec::new();
        let _ = self.try_for_each::<std::convert::Infallible, _>(|v| {
            out.push(v);
            Ok(())
        });
        out
    }
}

/// Plan and render every variant of `score`
pub fn augment(score: &Score, settings: &AugmentSettings) -> Result<Vec<Variant>> {
    Ok(AugmentationPlan::new(score, settings)?.variants())
}
