//! Pitch transposition over a configured interval

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoxmergeError};
use crate::score::Score;

/// Middle C, the pitch that maps to offset zero
pub const ANCHOR_PITCH: i32 = 60;

/// Highest octave accepted for an interval bound
pub const MAX_OCTAVE: u8 = 8;

/// Natural note names usable as an interval base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteName {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl NoteName {
    pub fn pitch_class(&self) -> i32 {
        match self {
            Self::C => 0,
            Self::D => 2,
            Self::E => 4,
            Self::F => 5,
            Self::G => 7,
            Self::A => 9,
            Self::B => 11,
        }
    }

    /// MIDI number of this note in the given octave (C4 = 60)
    pub fn pitch_in_octave(&self, octave: u8) -> i32 {
        12 * (octave as i32 + 1) + self.pitch_class()
    }
}

impl FromStr for NoteName {
    type Err = VoxmergeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "C" => Ok(Self::C),
            "D" => Ok(Self::D),
            "E" => Ok(Self::E),
            "F" => Ok(Self::F),
            "G" => Ok(Self::G),
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            other => Err(VoxmergeError::Configuration(format!(
                "interval note '{other}' must be one of C D E F G A B"
            ))),
        }
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Pitch window `note + low octave ..= note + high octave`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranspositionInterval {
    pub note: NoteName,
    pub low: u8,
    pub high: u8,
}

impl TranspositionInterval {
    pub fn new(note: NoteName, low: u8, high: u8) -> Result<Self> {
        if low > MAX_OCTAVE || high > MAX_OCTAVE {
            return Err(VoxmergeError::Configuration(format!(
                "interval bounds must be within 0-{MAX_OCTAVE}, got {low}-{high}"
            )));
        }
        if high < low {
            return Err(VoxmergeError::Configuration(format!(
                "interval high ({high}) is below interval low ({low})"
            )));
        }
        Ok(Self { note, low, high })
    }

    /// MIDI pitch window covered by the interval
    pub fn window(&self) -> RangeInclusive<i32> {
        self.note.pitch_in_octave(self.low)..=self.note.pitch_in_octave(self.high)
    }

    /// Semitone offsets, ascending, measured from middle C to each window pitch
    pub fn offsets(&self) -> RangeInclusive<i32> {
        let window = self.window();
        (window.start() - ANCHOR_PITCH)..=(window.end() - ANCHOR_PITCH)
    }
}

/// Shift every pitch by `semitones`. Notes pushed outside 0-127 are dropped.
pub fn transpose(score: &Score, semitones: i32) -> Score {
    if semitones == 0 {
        return score.clone();
    }
    score.map_events(|e| {
        let pitch = e.pitch() as i32 + semitones;
        (0..=127).contains(&pitch).then(|| e.with_pitch(pitch as u8))
    })
}

/// One transposed copy per offset of the interval, in ascending offset order
pub fn transpositions(score: &Score, interval: &TranspositionInterval) -> Vec<(i32, Score)> {
    interval
        .offsets()
        .map(|offset| (offset, transpose(score, offset)))
        .collect()
}
