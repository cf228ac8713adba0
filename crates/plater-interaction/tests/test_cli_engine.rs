#![cfg(unix)]

use plater_core::engine::{EngineFailureKind, PlateJob, SlicingEngine};
use plater_core::plate::Estimates;
use plater_core::request::FilamentMapping;
use plater_core::session::SessionId;
use plater_interaction::CliSlicingEngine;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use tempfile::TempDir;
use tokio::sync::mpsc;

fn write_script(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("fake-slicer.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn job() -> PlateJob {
    PlateJob {
        session_id: SessionId::from("s1"),
        file_id: "benchy.3mf".to_string(),
        model_path: Some(PathBuf::from("/models/benchy.3mf")),
        plate_index: 2,
        object_count: 3,
        mappings: vec![FilamentMapping::new(1, 0)],
        build_plate_type: "textured_pei".to_string(),
    }
}

#[tokio::test]
async fn test_streams_progress_and_returns_estimates() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        r#"
echo "loading"
echo "PROGRESS 10 slicing layer 1"
echo "PROGRESS 80 gcode"
echo 'RESULT {"prediction_seconds": 3600, "weight_grams": 14.2}'
"#,
    );
    let engine = CliSlicingEngine::new(script);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let estimates = engine.slice(job(), tx).await.unwrap();
    assert_eq!(estimates, Estimates::new(Some(3600), Some(14.2)));

    let first = rx.recv().await.unwrap();
    assert_eq!(first.phase, "slicing");
    assert_eq!(first.percent, 10.0);
    assert_eq!(first.message, "layer 1");
    assert_eq!(rx.recv().await.unwrap().phase, "gcode");
}

#[tokio::test]
async fn test_passes_plate_arguments() {
    let dir = TempDir::new().unwrap();
    let args_file = dir.path().join("args.txt");
    let script = write_script(
        &dir,
        &format!(
            "echo \"$@\" > {}\necho 'RESULT {{}}'",
            args_file.display()
        ),
    );
    let engine = CliSlicingEngine::new(script).with_args(vec!["--quiet".to_string()]);
    let (tx, _rx) = mpsc::unbounded_channel();

    engine.slice(job(), tx).await.unwrap();

    let args = std::fs::read_to_string(&args_file).unwrap();
    assert!(args.contains("--model /models/benchy.3mf"));
    assert!(args.contains("--plate 2"));
    assert!(args.contains("--build-plate textured_pei"));
    assert!(args.contains("--filaments [{\"filament_index\":1,\"slot\":0"));
    assert!(args.trim_end().ends_with("--quiet"));
}

#[tokio::test]
async fn test_exit_code_classification() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "echo 'archive is truncated' >&2\nexit 3");
    let (tx, _rx) = mpsc::unbounded_channel();

    let failure = CliSlicingEngine::new(script).slice(job(), tx).await.unwrap_err();
    assert_eq!(failure.kind, EngineFailureKind::FileCorrupt);
    assert_eq!(failure.message, "archive is truncated");
    assert!(failure.is_fatal());
}

#[tokio::test]
async fn test_parameter_error_is_recoverable() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "echo 'PROGRESS 5 slicing'\nexit 2");
    let (tx, _rx) = mpsc::unbounded_channel();

    let failure = CliSlicingEngine::new(script).slice(job(), tx).await.unwrap_err();
    assert_eq!(failure.kind, EngineFailureKind::InvalidParameters);
    assert!(!failure.is_fatal());
}

#[tokio::test]
async fn test_missing_result_is_a_plate_failure() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "echo 'PROGRESS 100 done'");
    let (tx, _rx) = mpsc::unbounded_channel();

    let failure = CliSlicingEngine::new(script).slice(job(), tx).await.unwrap_err();
    assert_eq!(failure.kind, EngineFailureKind::Other);
}

#[tokio::test]
async fn test_missing_executable_is_engine_unavailable() {
    let dir = TempDir::new().unwrap();
    let engine = CliSlicingEngine::new(dir.path().join("no-such-slicer"));
    let (tx, _rx) = mpsc::unbounded_channel();

    let failure = engine.slice(job(), tx).await.unwrap_err();
    assert_eq!(failure.kind, EngineFailureKind::EngineUnavailable);
    assert!(failure.is_fatal());
}
