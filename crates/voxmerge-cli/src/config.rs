use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use voxmerge_core::AugmentConfig;

pub(crate) fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("voxmerge")
        .join("config.toml")
}

/// Defaults, then the user config file, then `explicit` if given.
///
/// Layers merge key by key, so a file only needs the options it changes.
/// A broken user config file is skipped with a warning; a broken explicit
/// file is an error.
pub(crate) fn load_config(explicit: Option<&Path>) -> Result<AugmentConfig> {
    let mut table = toml::Table::new();

    let user = config_path();
    if user.is_file() {
        match read_table(&user) {
            Ok(layer) => {
                debug!("Loaded config from {}", user.display());
                table.extend(layer);
            }
            Err(e) => warn!("Ignoring {}: {e:#}", user.display()),
        }
    }

    if let Some(path) = explicit {
        table.extend(read_table(path)?);
        debug!("Loaded config from {}", path.display());
    }

    toml::Value::Table(table)
        .try_into()
        .context("invalid configuration")
}

fn read_table(path: &Path) -> Result<toml::Table> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    toml::from_str(&s).with_context(|| format!("cannot parse {}", path.display()))
}
