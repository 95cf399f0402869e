//! Configuration file discovery and loading
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. User config: `~/.config/singxd/<module>.toml`
//! 4. System config: `/etc/singxd/<module>.toml`
//!
//! When no file is found the caller falls back to built-in defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Locate the TOML config file for a module
///
/// Returns `None` when no candidate exists. An explicit path (CLI or ENV)
/// that does not exist is an error rather than a silent fallback.
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    module_name: &str,
) -> Result<Option<PathBuf>> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return explicit_path(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return explicit_path(PathBuf::from(path));
        }
    }

    // Priority 3/4: Platform locations
    Ok(default_config_candidates(module_name)
        .into_iter()
        .find(|p| p.exists()))
}

fn explicit_path(path: PathBuf) -> Result<Option<PathBuf>> {
    if path.exists() {
        Ok(Some(path))
    } else {
        Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )))
    }
}

/// Platform config locations, most specific first
fn default_config_candidates(module_name: &str) -> Vec<PathBuf> {
    let file_name = format!("{}.toml", module_name);
    let mut candidates = Vec::new();

    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("singxd").join(&file_name));
    }
    if cfg!(unix) {
        candidates.push(PathBuf::from("/etc/singxd").join(&file_name));
    }

    candidates
}

/// Load a TOML config file, or defaults when `path` is `None`
pub fn load_toml_or_default<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        warn!("No config file found, using built-in defaults");
        return Ok(T::default());
    };

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded config from {}", path.display());
    Ok(config)
}
