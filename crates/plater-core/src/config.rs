use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// External slicer executable, one process per plate.
    #[default]
    Cli,
    /// Object-count based simulation for development and demos.
    Simulated,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub kind: EngineKind,
    /// Slicer executable. Looked up in PATH when relative.
    pub command: String,
    /// Extra arguments appended to every invocation.
    pub args: Vec<String>,
    pub work_dir: Option<PathBuf>,
    /// Simulated engine only: time spent per object on a plate.
    pub seconds_per_object: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Cli,
            command: "plater-slicer".to_string(),
            args: Vec::new(),
            work_dir: None,
            seconds_per_object: 0.5,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
        }
    }
}

/// Root configuration, read from `config.toml`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PlaterConfig {
    pub debounce_ms: u64,
    pub inactivity_timeout_secs: u64,
    pub retention_secs: u64,
    pub watchdog_interval_secs: u64,
    /// Events buffered per session while no consumer is reading.
    pub channel_buffer: usize,
    pub engine: EngineConfig,
    pub server: ServerConfig,
    pub log_dir: Option<PathBuf>,
}

impl Default for PlaterConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            inactivity_timeout_secs: 300,
            retention_secs: 900,
            watchdog_interval_secs: 5,
            channel_buffer: 64,
            engine: EngineConfig::default(),
            server: ServerConfig::default(),
            log_dir: None,
        }
    }
}

impl PlaterConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs.max(1))
    }
}
