//! Instrument, clef and time signature rewrites

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::score::{Clef, Instrument, Score, TimeSignature};

/// Tags to stamp onto every output part and score. `None` leaves a tag as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeConversion {
    pub instrument: Option<Instrument>,
    pub clef: Option<Clef>,
    pub time_signature: Option<TimeSignature>,
}

impl AttributeConversion {
    pub fn new(instrument: Instrument, clef: Clef, time_signature: TimeSignature) -> Self {
        Self {
            instrument: Some(instrument),
            clef: Some(clef),
            time_signature: Some(time_signature),
        }
    }

    /// Rewrite tags. Event timing is never touched, even when the new meter
    /// does not divide the existing bars evenly.
    pub fn apply(&self, score: &Score) -> Score {
        let mut out = score.clone();
        for part in &mut out.parts {
            if let Some(instrument) = &self.instrument {
                part.instrument = instrument.clone();
            }
            if let Some(clef) = self.clef {
                part.clef = clef;
            }
        }
        if let Some(signature) = self.time_signature {
            if !bars_align(score, signature) {
                debug!(
                    "Meter {} does not divide {} bar(s) of {} evenly, keeping event timing",
                    signature,
                    score.measure_count(),
                    score.time_signature
                );
            }
            out.time_signature = signature;
        }
        out
    }
}

/// Whether the score's bar-padded length is a whole number of `signature` bars
pub fn bars_align(score: &Score, signature: TimeSignature) -> bool {
    let padded = score.time_signature.bar_length().times(score.measure_count());
    padded.is_multiple_of(signature.bar_length())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{Event, Part};
    use crate::time::Time;

    fn score() -> Score {
        let events = vec![
            Event::new(60, Time::ZERO, Time::from_quarters(3), 80),
            Event::new(62, Time::from_quarters(5), Time::new(1, 2), 80),
        ];
        let part = Part::new("flute", Instrument::from_program(73), Clef::Bass).with_events(events);
        Score::new(vec![part.clone(), part])
    }

    #[test]
    fn test_rewrites_tags_only() {
        let source = score();
        let conv = AttributeConversion::new(Instrument::default(), Clef::Treble, TimeSignature::new(3, 4));
        let out = conv.apply(&source);
        assert_eq!(out.time_signature, TimeSignature::new(3, 4));
        for (before, after) in source.parts.iter().zip(&out.parts) {
            assert_eq!(after.instrument.program, 0);
            assert_eq!(after.clef, Clef::Treble);
            assert_eq!(after.events(), before.events());
        }
    }

    #[test]
    fn test_empty_conversion_is_identity() {
        let source = score();
        assert_eq!(AttributeConversion::default().apply(&source), source);
    }

    #[test]
    fn test_bar_alignment() {
        // Two 4/4 bars = 8 quarters
        let source = score();
        assert!(bars_align(&source, TimeSignature::new(2, 4)));
        assert!(!bars_align(&source, TimeSignature::new(3, 4)));
    }
}
