//! YAML configuration I/O
//!
//! A missing file yields the type's defaults; an unreadable or unparsable
//! file logs a warning and also yields defaults, so a damaged config never
//! prevents the player from starting.

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Read a YAML config file, falling back to `T::default()` on any failure.
pub fn load_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("no config at {:?}, using defaults", path);
        return T::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("could not read {:?}: {}, using defaults", path, e);
            return T::default();
        }
    };

    match serde_yaml::from_str(&contents) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("could not parse {:?}: {}, using defaults", path, e);
            T::default()
        }
    }
}

/// Serialize `value` as YAML to `path`, creating parent directories as
/// needed.
pub fn save<T>(value: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(value).context("serializing config")?;
    std::fs::write(path, yaml).with_context(|| format!("writing config file {:?}", path))?;
    Ok(())
}
