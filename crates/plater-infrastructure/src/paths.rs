//! Platform directories for plater.
//!
//! ```text
//! ~/.config/plater/            # Config directory
//! ├── config.toml              # PlaterConfig
//! └── models.toml              # Default model manifest
//!
//! ~/.local/share/plater/       # Data directory
//! └── logs/                    # Rolling log files
//!     └── plater.log.YYYY-MM-DD
//! ```

use std::path::PathBuf;

const APP_NAME: &str = "plater";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// The platform has no config or data directory for this user.
    DirectoryNotFound(&'static str),
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::DirectoryNotFound(kind) => write!(f, "Cannot find {} directory", kind),
        }
    }
}

impl std::error::Error for PathError {}

pub struct PlaterPaths;

impl PlaterPaths {
    /// Returns the plater configuration directory (e.g. `~/.config/plater/`).
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_NAME))
            .ok_or(PathError::DirectoryNotFound("config"))
    }

    /// Returns the plater data directory (e.g. `~/.local/share/plater/`).
    pub fn data_dir() -> Result<PathBuf, PathError> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_NAME))
            .ok_or(PathError::DirectoryNotFound("data"))
    }

    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn models_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("models.toml"))
    }

    pub fn log_dir() -> Result<PathBuf, PathError> {
        Ok(Self::data_dir()?.join("logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_live_under_config_dir() {
        let Ok(config_dir) = PlaterPaths::config_dir() else {
            // headless CI without a home directory
            return;
        };
        assert!(config_dir.ends_with("plater"));
        assert_eq!(
            PlaterPaths::config_file().unwrap(),
            config_dir.join("config.toml")
        );
        assert_eq!(
            PlaterPaths::models_file().unwrap(),
            config_dir.join("models.toml")
        );
    }
}
