//! Sparse part removal

use tracing::{debug, info};

use crate::error::{Result, VoxmergeError};
use crate::score::Score;

/// Share of all notes held by each part, in part order
pub fn note_ratios(score: &Score) -> Vec<f64> {
    let total = score.event_count();
    score.parts
        .iter()
        .map(|p| if total == 0 { 0.0 } else { p.note_count() as f64 / total as f64 })
        .collect()
}

/// Drop every part holding less than `ratio` of the score's notes.
///
/// The threshold is inclusive: a part at exactly `ratio` survives. A ratio of
/// zero keeps every part, including empty ones.
pub fn remove_sparse_parts(score: &Score, ratio: f64) -> Result<Score> {
    let original = score.parts.len();
    let ratios = note_ratios(score);

    let mut removed = Vec::new();
    let parts = score.parts
        .iter()
        .zip(&ratios)
        .filter(|(part, part_ratio)| {
            debug!("Part \"{}\" with a note ratio of {:.2}%", part.name, *part_ratio * 100.0);
            let keep = ratio <= 0.0 || **part_ratio >= ratio;
            if !keep {
                removed.push(part.name.as_str());
            }
            keep
        })
        .map(|(part, _)| part.clone())
        .collect::<Vec<_>>();

    if parts.is_empty() {
        return Err(VoxmergeError::DegenerateScore { parts: original, ratio });
    }

    if !removed.is_empty() {
        info!(
            "Removed {} sparse part(s) {:?}, {} of {} left",
            removed.len(),
            removed,
            parts.len(),
            original
        );
    }

    Ok(score.with_parts(parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{Clef, Event, Instrument, Part};
    use crate::time::Time;

    fn part_with(name: &str, notes: usize) -> Part {
        let events = (0..notes)
            .map(|i| Event::new(60, Time::from_quarters(i as u64), Time::from_quarters(1), 90))
            .collect();
        Part::new(name, Instrument::default(), Clef::Treble).with_events(events)
    }

    #[test]
    fn test_zero_ratio_is_noop() {
        let score = Score::new(vec![part_with("a", 3), part_with("b", 0)]);
        let filtered = remove_sparse_parts(&score, 0.0).unwrap();
        assert_eq!(filtered, score);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        // b holds exactly 1/4 of the notes
        let score = Score::new(vec![part_with("a", 3), part_with("b", 1)]);
        let filtered = remove_sparse_parts(&score, 0.25).unwrap();
        assert_eq!(filtered.parts.len(), 2);

        // one note below the threshold
        let score = Score::new(vec![part_with("a", 4), part_with("b", 1)]);
        let filtered = remove_sparse_parts(&score, 0.25).unwrap();
        let names: Vec<&str> = filtered.parts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a"]);
    }

    #[test]
    fn test_full_ratio_keeps_densest_only() {
        let score = Score::new(vec![part_with("a", 5), part_with("b", 1)]);
        assert!(matches!(
            remove_sparse_parts(&score, 1.0),
            Err(VoxmergeError::DegenerateScore { parts: 2, .. })
        ));

        let score = Score::new(vec![part_with("solo", 5), part_with("silent", 0)]);
        let filtered = remove_sparse_parts(&score, 1.0).unwrap();
        assert_eq!(filtered.parts.len(), 1);
        assert_eq!(filtered.parts[0].name, "solo");
    }

    #[test]
    fn test_source_untouched() {
        let score = Score::new(vec![part_with("a", 9), part_with("b", 1)]);
        let before = score.clone();
        let _ = remove_sparse_parts(&score, 0.5).unwrap();
        assert_eq!(score, before);
    }
}
