//! Batch processing of input files on a worker pool

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crossbeam_channel::{bounded, unbounded};
use serde::Serialize;
use tracing::{error, info, warn};
use voxmerge_core::{separate_voices, split_score, AugmentSettings, AugmentationPlan};

use crate::codec::{read_score, write_score};
use crate::error::Result;

/// Outcome of one input file
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    /// Files written for this input, or why it was skipped
    pub outcome: Result<Vec<PathBuf>>,
}

impl FileReport {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn written(&self) -> &[PathBuf] {
        self.outcome.as_deref().unwrap_or(&[])
    }
}

/// Reports for every input of a run, in input order
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub reports: Vec<FileReport>,
}

impl BatchSummary {
    pub fn files_written(&self) -> usize {
        self.reports.iter().map(|r| r.written().len()).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileReport> {
        self.reports.iter().filter(|r| !r.is_ok())
    }

    /// Inputs that could not be read or decoded
    pub fn codec_failures(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome.as_ref().is_err_and(|e| e.is_codec()))
            .count()
    }
}

#[derive(Serialize)]
struct Manifest<'a> {
    source: String,
    parts: Vec<&'a str>,
    outputs: Vec<ManifestEntry>,
}

#[derive(Serialize)]
struct ManifestEntry {
    file: String,
    offset: i32,
    quantization: u8,
    groups: Vec<Vec<usize>>,
}

/// Runs file jobs on a pool of worker threads, writing into one folder
#[derive(Debug, Clone)]
pub struct BatchRunner {
    target_folder: PathBuf,
    workers: usize,
}

impl BatchRunner {
    pub fn new(target_folder: impl Into<PathBuf>, workers: usize) -> Self {
        Self {
            target_folder: target_folder.into(),
            workers: workers.max(1),
        }
    }

    /// Create the target folder when it does not exist
    pub fn prepare(&self) -> std::io::Result<()> {
        if !self.target_folder.is_dir() {
            info!("Create target folder at \"{}\"", self.target_folder.display());
            std::fs::create_dir_all(&self.target_folder)?;
        }
        Ok(())
    }

    /// Reduce and augment every input
    pub fn augment(&self, inputs: &[PathBuf], settings: &AugmentSettings) -> BatchSummary {
        self.run(inputs, |path, stem| self.augment_file(path, stem, settings))
    }

    /// Cut every input into slices of `seconds`
    pub fn split(&self, inputs: &[PathBuf], seconds: u64) -> BatchSummary {
        self.run(inputs, |path, stem| {
            let score = read_score(path)?;
            let slices = split_score(&score, seconds)?;
            let mut written = Vec::with_capacity(slices.len());
            for (index, slice) in slices.iter().enumerate() {
                let out = self.output_path(stem, &format!("split-{}", index + 1), "mid");
                write_score(slice, &out)?;
                written.push(out);
            }
            Ok(written)
        })
    }

    /// Split every part of every input into monophonic parts
    pub fn separate(&self, inputs: &[PathBuf]) -> BatchSummary {
        self.run(inputs, |path, stem| {
            let score = read_score(path)?;
            let out = self.output_path(stem, "separated", "mid");
            write_score(&separate_voices(&score), &out)?;
            Ok(vec![out])
        })
    }

    fn augment_file(&self, path: &Path, stem: &str, settings: &AugmentSettings) -> Result<Vec<PathBuf>> {
        info!("Import file at \"{}\"", path.display());
        let score = read_score(path)?;
        if score.event_count() > 10_000 {
            warn!("\"{}\" is a rather large file and might take some time", path.display());
        }

        let plan = AugmentationPlan::new(&score, settings)?;
        let mut written = Vec::new();
        let mut entries = Vec::new();
        plan.try_for_each(|variant| {
            let out = self.output_path(stem, &variant.branch.suffix(), "mid");
            if variant.score.event_count() == 0 {
                warn!("Skipping {}: no notes left in this branch", out.display());
                return Ok(());
            }
            write_score(&variant.score, &out)?;
            entries.push(ManifestEntry {
                file: file_name(&out),
                offset: variant.branch.offset,
                quantization: variant.branch.denominator.get(),
                groups: variant.branch.partition.groups().to_vec(),
            });
            written.push(out);
            Ok::<(), crate::error::ServiceError>(())
        })?;

        let manifest = Manifest {
            source: file_name(path),
            parts: plan.filtered().parts.iter().map(|p| p.name.as_str()).collect(),
            outputs: entries,
        };
        let manifest_path = self.output_path(stem, "manifest", "json");
        std::fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?)?;

        info!("Wrote {} file(s) for \"{}\"", written.len(), path.display());
        Ok(written)
    }

    /// `<target>/<stem>-<suffix>.<ext>`
    fn output_path(&self, stem: &str, suffix: &str, ext: &str) -> PathBuf {
        self.target_folder.join(format!("{stem}-{suffix}.{ext}"))
    }

    /// Feed inputs to the workers and collect reports back in input order.
    /// A failing input never affects the others.
    fn run<F>(&self, inputs: &[PathBuf], job: F) -> BatchSummary
    where
        F: Fn(&Path, &str) -> Result<Vec<PathBuf>> + Sync,
    {
        let stems = output_stems(inputs);
        let workers = self.workers.min(inputs.len()).max(1);
        let (job_tx, job_rx) = bounded::<(usize, &Path, &str)>(workers * 2);
        let (done_tx, done_rx) = unbounded::<(usize, FileReport)>();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let rx = job_rx.clone();
                let tx = done_tx.clone();
                let job = &job;
                scope.spawn(move || {
                    for (index, path, stem) in rx.iter() {
                        let outcome = job(path, stem);
                        if let Err(e) = &outcome {
                            error!("Skipped \"{}\": {}", path.display(), e);
                        }
                        let report = FileReport {
                            path: path.to_path_buf(),
                            outcome,
                        };
                        if tx.send((index, report)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(done_tx);

            for (index, (path, stem)) in inputs.iter().zip(&stems).enumerate() {
                if job_tx.send((index, path.as_path(), stem.as_str())).is_err() {
                    break;
                }
            }
            drop(job_tx);
        });

        let mut reports: Vec<(usize, FileReport)> = done_rx.iter().collect();
        reports.sort_by_key(|(index, _)| *index);
        BatchSummary {
            reports: reports.into_iter().map(|(_, r)| r).collect(),
        }
    }
}

/// Name stems for each input's outputs, in input order.
///
/// Inputs from different folders may share a file stem. Those are numbered
/// `<stem>-1`, `<stem>-2`, ... in input order, skipping names already in use,
/// so no two inputs write to the same files. Case is ignored when comparing.
fn output_stems(inputs: &[PathBuf]) -> Vec<String> {
    let stems: Vec<String> = inputs
        .iter()
        .map(|p| {
            p.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "score".into())
        })
        .collect();
    let mut occurrences: HashMap<String, usize> = HashMap::new();
    for stem in &stems {
        *occurrences.entry(stem.to_lowercase()).or_default() += 1;
    }
    let mut taken: HashSet<String> = occurrences.keys().cloned().collect();

    stems
        .into_iter()
        .zip(inputs)
        .map(|(stem, path)| {
            if occurrences[&stem.to_lowercase()] < 2 {
                return stem;
            }
            let mut n = 1;
            loop {
                let numbered = format!("{stem}-{n}");
                if taken.insert(numbered.to_lowercase()) {
                    warn!(
                        "\"{}\" shares its name with another input, writing as {}",
                        path.display(),
                        numbered
                    );
                    return numbered;
                }
                n += 1;
            }
        })
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
