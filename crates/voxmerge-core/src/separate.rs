//! Splitting polyphonic parts into monophonic ones

use crate::score::{Event, Part, Score};
use crate::time::Time;

/// Replace each part with as many monophonic parts as it needs.
///
/// Events are assigned in start order to the first voice that has finished
/// sounding, or to a new voice when all are busy. Single-voice and empty
/// parts pass through unchanged.
pub fn separate_voices(score: &Score) -> Score {
    let parts = score.parts.iter().flat_map(separate_part).collect();
    score.with_parts(parts)
}

fn separate_part(part: &Part) -> Vec<Part> {
    let mut voices: Vec<(Time, Vec<Event>)> = Vec::new();
    for event in part.events() {
        match voices.iter_mut().find(|(free_at, _)| *free_at <= event.start()) {
            Some((free_at, events)) => {
                *free_at = event.end();
                events.push(*event);
            }
            None => voices.push((event.end(), vec![*event])),
        }
    }

    if voices.len() <= 1 {
        return vec![part.clone()];
    }
    voices
        .into_iter()
        .enumerate()
        .map(|(i, (_, events))| {
            Part::new(format!("{} (voice {})", part.name, i + 1), part.instrument.clone(), part.clef)
                .with_events(events)
        })
        .collect()
}
