//! Run configuration and its validation

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::attributes::AttributeConversion;
use crate::error::{Result, VoxmergeError};
use crate::partition::VoiceDistribution;
use crate::quantize::Denominator;
use crate::score::{Clef, Instrument, TimeSignature};
use crate::transpose::{NoteName, TranspositionInterval};

pub const DEFAULT_TARGET_FOLDER: &str = "./generated/";

/// Raw options as they come from a config file or the command line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AugmentConfig {
    /// Output directory, created if absent
    pub target_folder: PathBuf,
    /// Base note of the transposition interval
    pub interval_note: String,
    /// Lower octave of the transposition interval (0-8)
    pub interval_low: u8,
    /// Upper octave of the transposition interval (0-8)
    pub interval_high: u8,
    pub time_signature: String,
    pub instrument: String,
    pub clef: String,
    /// Number of voices in every output score
    pub voice_num: usize,
    /// Share of alternative groupings kept per voice, one entry per voice
    pub voice_distribution: Vec<f64>,
    /// Grid divisions per quarter note, one output copy each
    pub quantization: Vec<u8>,
    /// Minimum share of all notes a part needs to survive
    pub part_ratio: f64,
    /// Worker threads, defaults to available parallelism
    pub workers: Option<usize>,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            target_folder: PathBuf::from(DEFAULT_TARGET_FOLDER),
            interval_note: "C".into(),
            interval_low: 3,
            interval_high: 5,
            time_signature: "4/4".into(),
            instrument: "piano".into(),
            clef: "treble".into(),
            voice_num: 5,
            voice_distribution: vec![0.1, 0.2, 0.3, 0.2, 0.2],
            quantization: vec![4, 3],
            part_ratio: 0.015,
            workers: None,
        }
    }
}

/// Validated, immutable settings shared by every file of a run
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentSettings {
    pub target_folder: PathBuf,
    pub interval: TranspositionInterval,
    pub quantization: Vec<Denominator>,
    pub distribution: VoiceDistribution,
    pub part_ratio: f64,
    pub conversion: AttributeConversion,
    pub workers: usize,
}

impl AugmentSettings {
    pub fn voice_num(&self) -> usize {
        self.distribution.len()
    }

    /// Number of score variants emitted per input before partitioning
    pub fn branch_factor(&self) -> usize {
        self.interval.offsets().count() * self.quantization.len()
    }
}

impl AugmentConfig {
    /// Check every option once, before any input is touched
    pub fn validate(&self) -> Result<AugmentSettings> {
        if self.voice_num == 0 {
            return Err(VoxmergeError::Configuration("voice_num must be at least 1".into()));
        }
        if self.voice_distribution.len() != self.voice_num {
            return Err(VoxmergeError::Configuration(format!(
                "voice_distribution has {} value(s) but voice_num is {}",
                self.voice_distribution.len(),
                self.voice_num
            )));
        }
        let distribution = VoiceDistribution::new(self.voice_distribution.clone())?;

        let note: NoteName = self.interval_note.parse()?;
        let interval = TranspositionInterval::new(note, self.interval_low, self.interval_high)?;

        if self.quantization.is_empty() {
            return Err(VoxmergeError::Configuration("quantization needs at least one value".into()));
        }
        let mut quantization: Vec<Denominator> = Vec::with_capacity(self.quantization.len());
        for value in &self.quantization {
            let d = Denominator::new(*value)?;
            if !quantization.contains(&d) {
                quantization.push(d);
            }
        }

        if !(0.0..=1.0).contains(&self.part_ratio) {
            return Err(VoxmergeError::Configuration(format!(
                "part_ratio {} is outside 0.0-1.0",
                self.part_ratio
            )));
        }

        let conversion = AttributeConversion::new(
            self.instrument.parse::<Instrument>()?,
            self.clef.parse::<Clef>()?,
            self.time_signature.parse::<TimeSignature>()?,
        );

        let workers = match self.workers {
            Some(0) => {
                return Err(VoxmergeError::Configuration("workers must be at least 1".into()));
            }
            Some(n) => n,
            None => std::thread::available_parallelism().map_or(1, |n| n.get()),
        };

        let settings = AugmentSettings {
            target_folder: self.target_folder.clone(),
            interval,
            quantization,
            distribution,
            part_ratio: self.part_ratio,
            conversion,
            workers,
        };
        info!(
            "Config: {} voice(s), offsets {:?}, quantization {:?}, part ratio {}, {} worker(s)",
            settings.voice_num(),
            settings.interval.offsets(),
            self.quantization,
            settings.part_ratio,
            settings.workers
        );
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let settings = AugmentConfig::default().validate().unwrap();
        assert_eq!(settings.voice_num(), 5);
        assert_eq!(settings.interval.offsets(), -12..=12);
        assert_eq!(settings.quantization.len(), 2);
        assert_eq!(settings.branch_factor(), 50);
        assert!(settings.workers >= 1);
    }

    #[test]
    fn test_distribution_length_must_match() {
        let config = AugmentConfig {
            voice_num: 2,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(VoxmergeError::Configuration(_))));
    }

    #[test]
    fn test_rejects_invalid_options() {
        let cases = [
            AugmentConfig { voice_num: 0, voice_distribution: vec![], ..Default::default() },
            AugmentConfig { voice_num: 1, voice_distribution: vec![0.0], ..Default::default() },
            AugmentConfig { interval_low: 6, interval_high: 5, ..Default::default() },
            AugmentConfig { interval_note: "X".into(), ..Default::default() },
            AugmentConfig { quantization: vec![], ..Default::default() },
            AugmentConfig { quantization: vec![4, 9], ..Default::default() },
            AugmentConfig { part_ratio: 1.5, ..Default::default() },
            AugmentConfig { time_signature: "4-4".into(), ..Default::default() },
            AugmentConfig { clef: "nope".into(), ..Default::default() },
            AugmentConfig { instrument: "theremin-ish".into(), ..Default::default() },
            AugmentConfig { workers: Some(0), ..Default::default() },
        ];
        for config in cases {
            assert!(config.validate().is_err(), "{config:?} should be rejected");
        }
    }

    #[test]
    fn test_duplicate_denominators_collapse() {
        let config = AugmentConfig {
            quantization: vec![4, 3, 4],
            ..Default::default()
        };
        let settings = config.validate().unwrap();
        let values: Vec<u8> = settings.quantization.iter().map(Denominator::get).collect();
        assert_eq!(values, vec![4, 3]);
    }
}
