//! Grid quantization of event timing

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoxmergeError};
use crate::score::Score;
use crate::time::Time;

/// Grid divisions per quarter note (4 = sixteenths, 3 = eighth triplets)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Denominator(u8);

impl Denominator {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 6;

    pub fn new(value: u8) -> Result<Self> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(VoxmergeError::Configuration(format!(
                "quantization value {value} is outside {}-{}",
                Self::MIN,
                Self::MAX
            )));
        }
        Ok(Self(value))
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// Length of one grid step
    pub fn step(&self) -> Time {
        Time::new(1, self.0 as u64)
    }
}

impl TryFrom<u8> for Denominator {
    type Error = VoxmergeError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Denominator> for u8 {
    fn from(d: Denominator) -> u8 {
        d.0
    }
}

/// Snap start and duration of every event to the grid.
///
/// Both values round to the nearest boundary, halfway points to the earlier
/// one. Events whose duration snaps to zero are removed.
pub fn quantize(score: &Score, denominator: Denominator) -> Score {
    let divisions = denominator.get() as u64;
    score.map_events(|e| {
        let duration = e.duration().snap(divisions);
        if duration.is_zero() {
            return None;
        }
        Some(e.with_timing(e.start().snap(divisions), duration))
    })
}

/// One quantized copy per denominator, in the given order
pub fn quantizations(score: &Score, denominators: &[Denominator]) -> Vec<(Denominator, Score)> {
    denominators
        .iter()
        .map(|d| (*d, quantize(score, *d)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{Clef, Event, Instrument, Part};

    fn t(num: u64, den: u64) -> Time {
        Time::new(num, den)
    }

    fn single(events: Vec<Event>) -> Score {
        Score::new(vec![Part::new("p", Instrument::default(), Clef::Treble).with_events(events)])
    }

    #[test]
    fn test_snaps_start_and_duration() {
        let score = single(vec![Event::new(60, t(3, 10), t(9, 10), 90)]);
        let q = quantize(&score, Denominator::new(4).unwrap());
        let e = q.parts[0].events()[0];
        assert_eq!(e.start(), t(1, 4));
        assert_eq!(e.duration(), t(1, 1));
        assert_eq!(e.pitch(), 60);
        assert_eq!(e.velocity(), 90);
    }

    #[test]
    fn test_idempotent() {
        let score = single(vec![
            Event::new(60, t(1, 7), t(5, 9), 90),
            Event::new(62, t(11, 5), t(2, 3), 90),
        ]);
        for d in 1..=6 {
            let d = Denominator::new(d).unwrap();
            let once = quantize(&score, d);
            assert_eq!(quantize(&once, d), once);
        }
    }

    #[test]
    fn test_short_events_are_removed() {
        // Sixteenth grid: half a step is 1/8 quarter
        let score = single(vec![
            Event::new(60, t(0, 1), t(1, 10), 90),
            Event::new(61, t(1, 1), t(1, 8), 90),
            Event::new(62, t(2, 1), t(3, 20), 90),
        ]);
        let q = quantize(&score, Denominator::new(4).unwrap());
        let pitches: Vec<u8> = q.events().map(Event::pitch).collect();
        assert_eq!(pitches, vec![62]);
        assert!(q.events().all(|e| !e.duration().is_zero()));
    }

    #[test]
    fn test_one_copy_per_denominator() {
        let score = single(vec![Event::new(60, t(1, 2), t(1, 2), 90)]);
        let ds = [Denominator::new(4).unwrap(), Denominator::new(3).unwrap()];
        let copies = quantizations(&score, &ds);
        assert_eq!(copies.len(), 2);
        assert_eq!(copies[0].1.parts[0].events()[0].start(), t(1, 2));
        // 1/2 is halfway between 1/3 and 2/3 on the triplet grid
        assert_eq!(copies[1].1.parts[0].events()[0].start(), t(1, 3));
    }

    #[test]
    fn test_denominator_bounds() {
        assert!(Denominator::new(0).is_err());
        assert!(Denominator::new(7).is_err());
        assert_eq!(Denominator::new(6).unwrap().step(), t(1, 6));
    }
}
