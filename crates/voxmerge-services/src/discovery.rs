//! Input path resolution

use std::path::{Path, PathBuf};

use tracing::warn;

const MIDI_EXTENSIONS: &[&str] = &["mid", "midi"];

/// A path that was given but will not be processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedInput {
    pub path: PathBuf,
    pub reason: String,
}

/// Whether a path has a MIDI file extension
pub fn is_midi_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| MIDI_EXTENSIONS.iter().any(|m| e.eq_ignore_ascii_case(m)))
}

/// Expand the given paths into MIDI files.
///
/// Files are kept in the given order; directories contribute their MIDI
/// files (not recursively) sorted by name. Duplicates are dropped and every
/// skipped path is returned with a reason.
pub fn discover_inputs(paths: &[PathBuf]) -> (Vec<PathBuf>, Vec<SkippedInput>) {
    let mut found: Vec<PathBuf> = Vec::new();
    let mut skipped = Vec::new();
    let mut skip = |path: &Path, reason: String| {
        warn!("Ignoring \"{}\": {}", path.display(), reason);
        skipped.push(SkippedInput { path: path.to_path_buf(), reason });
    };

    for path in paths {
        if path.is_dir() {
            match std::fs::read_dir(path) {
                Ok(entries) => {
                    let mut files: Vec<PathBuf> = entries
                        .flatten()
                        .map(|e| e.path())
                        .filter(|p| p.is_file() && is_midi_path(p))
                        .collect();
                    files.sort();
                    if files.is_empty() {
                        skip(path, "folder holds no MIDI files".into());
                    }
                    found.extend(files);
                }
                Err(e) => skip(path, format!("folder could not be read ({e})")),
            }
        } else if !path.is_file() {
            skip(path, "could not be found".into());
        } else if !is_midi_path(path) {
            skip(path, "does not end with .mid or .midi".into());
        } else {
            found.push(path.clone());
        }
    }

    let mut seen = std::collections::HashSet::new();
    found.retain(|p| seen.insert(p.clone()));
    (found, skipped)
}
