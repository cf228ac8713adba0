//! Configuration service implementation.
//!
//! Loads `PlaterConfig` from `~/.config/plater/config.toml` or an explicit
//! path. A missing file means defaults; a malformed file is an error.

use crate::paths::PlaterPaths;
use plater_core::config::PlaterConfig;
use plater_core::error::{Result, SliceError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Configuration service that loads and caches the root configuration.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: Option<PathBuf>,
    /// Cached configuration loaded from file.
    config: Arc<RwLock<Option<PlaterConfig>>>,
}

impl ConfigService {
    /// Uses the platform config file.
    pub fn new() -> Self {
        Self {
            path: None,
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Uses an explicit config file instead of the platform default.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Gets the configuration, loading from file if not cached.
    pub fn get_config(&self) -> Result<PlaterConfig> {
        if let Ok(read_lock) = self.config.read()
            && let Some(cached) = read_lock.as_ref()
        {
            return Ok(cached.clone());
        }

        let loaded = self.load_config()?;
        if let Ok(mut write_lock) = self.config.write() {
            *write_lock = Some(loaded.clone());
        }
        Ok(loaded)
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        if let Ok(mut write_lock) = self.config.write() {
            *write_lock = None;
        }
    }

    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => PlaterPaths::config_file().map_err(|e| SliceError::config(e.to_string())),
        }
    }

    fn load_config(&self) -> Result<PlaterConfig> {
        let path = self.config_path()?;
        load_from(&path)
    }
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new()
    }
}

fn load_from(path: &Path) -> Result<PlaterConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "[ConfigService] no config file, using defaults");
        return Ok(PlaterConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: PlaterConfig = toml::from_str(&content)?;
    tracing::debug!(path = %path.display(), "[ConfigService] loaded config");
    Ok(config)
}
