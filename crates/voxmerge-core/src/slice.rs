//! Fixed-duration slicing of a score

use tracing::debug;

use crate::error::{Result, VoxmergeError};
use crate::score::{Part, Score};
use crate::time::Time;

/// Cut `score` into consecutive slices of `seconds` each, at the score tempo.
///
/// An event lands in every slice it overlaps. Its start is re-based onto the
/// slice start and any portion sounding before that start is trimmed off.
/// Every part appears in every slice, possibly empty.
pub fn split_score(score: &Score, seconds: u64) -> Result<Vec<Score>> {
    if seconds == 0 {
        return Err(VoxmergeError::Configuration("slice duration must be at least 1 second".into()));
    }
    let length = Time::from_seconds(seconds, score.tempo);
    let end = score.end();
    let mut count = end.div_floor(length);
    if !end.is_multiple_of(length) {
        count += 1;
    }

    let slices = (0..count)
        .map(|index| {
            let from = length.times(index);
            let to = from + length;
            let parts: Vec<Part> = score.parts
                .iter()
                .map(|part| {
                    part.map_events(|e| {
                        if e.end() <= from || e.start() >= to {
                            return None;
                        }
                        let start = e.start().max(from);
                        Some(e.with_timing(start - from, e.end() - start))
                    })
                })
                .collect();
            let slice = score.with_parts(parts);
            debug!("Slice #{} has {} note(s)", index + 1, slice.event_count());
            slice
        })
        .collect();
    Ok(slices)
}
