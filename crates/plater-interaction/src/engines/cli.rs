//! CliSlicingEngine - runs an external slicer executable once per plate.
//!
//! # Protocol
//!
//! The slicer is invoked as
//!
//! ```text
//! <command> --model <path> --plate <n> --build-plate <type> --filaments <json> [args...]
//! ```
//!
//! and reports on stdout, one record per line:
//!
//! ```text
//! PROGRESS <percent> <phase> [message]
//! RESULT {"prediction_seconds": 5400, "weight_grams": 31.2}
//! ```
//!
//! Other lines are ignored. Exit codes: `0` success (a `RESULT` line is
//! required), `2` invalid parameters, `3` corrupt model file, `4` unsupported
//! material, anything else is a generic plate failure.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use plater_core::config::EngineConfig;
use plater_core::engine::{
    EngineFailure, EngineFailureKind, EngineNotification, NotificationSink, PlateJob,
    SlicingEngine,
};
use plater_core::plate::Estimates;
use regex::Regex;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

static PROGRESS_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^PROGRESS\s+(\d+(?:\.\d+)?)\s+(\S+)(?:\s+(.*))?$").expect("valid progress regex")
});

static RESULT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^RESULT\s+(\{.*\})\s*$").expect("valid result regex"));

/// A recognized stdout record.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SlicerLine {
    Progress(EngineNotification),
    Result(Estimates),
}

/// Parses one stdout line. Unrecognized lines yield `None`.
pub(crate) fn parse_line(line: &str) -> Option<SlicerLine> {
    let line = line.trim();
    if let Some(caps) = PROGRESS_LINE.captures(line) {
        let percent: f32 = caps.get(1)?.as_str().parse().ok()?;
        let phase = caps.get(2)?.as_str();
        let message = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
        return Some(SlicerLine::Progress(EngineNotification::new(
            phase, percent, message,
        )));
    }
    if let Some(caps) = RESULT_LINE.captures(line) {
        return match serde_json::from_str::<Estimates>(caps.get(1)?.as_str()) {
            Ok(estimates) => Some(SlicerLine::Result(estimates)),
            Err(e) => {
                tracing::warn!("[CliSlicingEngine] unreadable RESULT line: {}", e);
                None
            }
        };
    }
    None
}

/// Maps a failed exit to a plate failure.
pub(crate) fn classify_exit(code: Option<i32>, stderr: &str) -> EngineFailure {
    let detail = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string);
    let message = |fallback: String| detail.clone().unwrap_or(fallback);

    match code {
        Some(2) => EngineFailure::invalid_parameters(message("invalid slicing parameters".into())),
        Some(3) => EngineFailure::file_corrupt(message("model file is corrupt".into())),
        Some(4) => EngineFailure::new(
            EngineFailureKind::UnsupportedMaterial,
            message("unsupported material".into()),
        ),
        Some(code) => EngineFailure::new(
            EngineFailureKind::Other,
            message(format!("slicer exited with code {}", code)),
        ),
        None => EngineFailure::new(
            EngineFailureKind::Other,
            message("slicer terminated by signal".into()),
        ),
    }
}

pub struct CliSlicingEngine {
    /// Slicer executable; looked up in PATH when not a path.
    command: PathBuf,
    args: Vec<String>,
    work_dir: Option<PathBuf>,
}

impl CliSlicingEngine {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            work_dir: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            command: PathBuf::from(&config.command),
            args: config.args.clone(),
            work_dir: config.work_dir.clone(),
        }
    }

    /// Extra arguments appended to every invocation.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(work_dir.into());
        self
    }

    fn build_command(&self, job: &PlateJob) -> Result<Command, EngineFailure> {
        let model = job
            .model_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(&job.file_id));
        let filaments = serde_json::to_string(&job.mappings).map_err(|e| {
            EngineFailure::invalid_parameters(format!("cannot encode filament mappings: {}", e))
        })?;

        let mut cmd = Command::new(&self.command);
        cmd.arg("--model")
            .arg(&model)
            .arg("--plate")
            .arg(job.plate_index.to_string())
            .arg("--build-plate")
            .arg(&job.build_plate_type)
            .arg("--filaments")
            .arg(filaments)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // dropping the slice future (cancel, timeout) must not leave the slicer running
            .kill_on_drop(true);

        if let Some(dir) = &self.work_dir {
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }

    fn finish(
        &self,
        status: ExitStatus,
        stderr: &str,
        estimates: Option<Estimates>,
    ) -> Result<Estimates, EngineFailure> {
        if !status.success() {
            return Err(classify_exit(status.code(), stderr));
        }
        estimates.ok_or_else(|| {
            EngineFailure::new(
                EngineFailureKind::Other,
                "slicer exited without reporting a RESULT",
            )
        })
    }
}

#[async_trait]
impl SlicingEngine for CliSlicingEngine {
    fn name(&self) -> &str {
        "cli"
    }

    async fn slice(
        &self,
        job: PlateJob,
        notifications: NotificationSink,
    ) -> Result<Estimates, EngineFailure> {
        let plate_index = job.plate_index;
        let mut child = self.build_command(&job)?.spawn().map_err(|e| {
            tracing::error!(
                command = %self.command.display(),
                "[CliSlicingEngine] failed to spawn slicer: {}",
                e
            );
            EngineFailure::unavailable(format!(
                "failed to start slicer '{}': {}",
                self.command.display(),
                e
            ))
        })?;
        tracing::debug!(plate_index, pid = ?child.id(), "[CliSlicingEngine] slicer started");

        let stderr_reader = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let mut estimates = None;
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(plate_index, "[CliSlicingEngine] stdout read failed: {}", e);
                        break;
                    }
                };
                match parse_line(&line) {
                    Some(SlicerLine::Progress(update)) => {
                        let _ = notifications.send(update);
                    }
                    Some(SlicerLine::Result(result)) => estimates = Some(result),
                    None => tracing::trace!(plate_index, line = %line, "[CliSlicingEngine] ignored line"),
                }
            }
        }

        let status = child.wait().await.map_err(|e| {
            EngineFailure::new(
                EngineFailureKind::Other,
                format!("failed to wait for slicer: {}", e),
            )
        })?;
        let stderr = match stderr_reader {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };

        tracing::debug!(plate_index, %status, "[CliSlicingEngine] slicer exited");
        self.finish(status, &stderr, estimates)
    }
}
