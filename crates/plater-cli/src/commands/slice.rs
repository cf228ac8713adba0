//! `plater slice`: run one session in-process and render its progress.

use crate::runtime::SliceRuntime;
use anyhow::{Result, bail};
use colored::Colorize;
use plater_core::aggregator::{AggregateStatus, ProgressAggregator};
use plater_core::SliceError;
use plater_core::config::PlaterConfig;
use plater_core::plate::{PlateInfo, PlateRegistry};
use plater_core::request::SliceRequest;
use plater_core::session::ProgressEvent;
use plater_infrastructure::ModelManifest;
use std::path::Path;
use std::sync::Arc;

pub async fn run(config: PlaterConfig, models: &Path, request: SliceRequest) -> Result<()> {
    let registry = Arc::new(ModelManifest::load(models).await?.into_registry());
    let runtime = SliceRuntime::start(&config, registry.clone());
    let file_id = request.file_id.clone();

    let outcome = drive(&runtime, request).await;
    runtime.shutdown();
    let aggregator = outcome?;

    let plates = registry.plates(&file_id).await?.unwrap_or_default();
    print_summary(&plates);

    match aggregator.status() {
        AggregateStatus::Completed { failed_plates } => {
            for error in plate_errors(&aggregator, failed_plates) {
                println!("{} {}", "!".yellow().bold(), error);
            }
            Ok(())
        }
        AggregateStatus::Failed { kind, message } => bail!("slice failed ({}): {}", kind, message),
        AggregateStatus::InProgress => bail!("progress stream ended without a terminal event"),
    }
}

async fn drive(runtime: &SliceRuntime, request: SliceRequest) -> Result<ProgressAggregator> {
    let manager = &runtime.manager;
    let session_id = manager.start_or_get(request).await?;
    let session = manager.get_state(&session_id).await?;
    let mut subscription = manager.attach(&session_id).await?;
    let mut aggregator = ProgressAggregator::new(session.plates.iter().copied());

    println!(
        "{} session {} ({} plate(s))",
        "▶".cyan().bold(),
        session_id,
        session.plates.len()
    );

    loop {
        tokio::select! {
            event = subscription.next() => {
                let Some(event) = event else { break };
                aggregator.apply(&event);
                render(&event, &aggregator);
            }
            _ = tokio::signal::ctrl_c() => {
                println!("{} cancelling...", "■".yellow());
                manager.cancel(&session_id).await?;
            }
        }
    }

    Ok(aggregator)
}

fn render(event: &ProgressEvent, aggregator: &ProgressAggregator) {
    let overall = format!("[{:>5.1}%]", aggregator.display_percent());
    match event {
        ProgressEvent::Start { .. } => {}
        ProgressEvent::Progress { progress } if progress.is_error() => println!(
            "{} plate {} {}",
            overall.dimmed(),
            progress.plate_index,
            progress.message.red()
        ),
        ProgressEvent::Progress { progress } if progress.is_complete => println!(
            "{} plate {} {}",
            overall.dimmed(),
            progress.plate_index,
            "done".green()
        ),
        ProgressEvent::Progress { progress } => println!(
            "{} plate {} {} {:.0}% {}",
            overall.dimmed(),
            progress.plate_index,
            progress.phase,
            progress.progress_percent,
            progress.message.dimmed()
        ),
        ProgressEvent::Complete { .. } => println!("{} {}", overall.dimmed(), "complete".green().bold()),
        ProgressEvent::Error { kind, message } => {
            println!("{} {} ({}): {}", overall.dimmed(), "error".red().bold(), kind, message)
        }
    }
}

/// Recoverable failures of a completed job, in plate order.
fn plate_errors(aggregator: &ProgressAggregator, failed_plates: &[u32]) -> Vec<SliceError> {
    failed_plates
        .iter()
        .filter_map(|&plate_index| {
            let message = aggregator.latest(plate_index)?.error.clone()?;
            Some(SliceError::RecoverablePlate {
                plate_index,
                message,
            })
        })
        .collect()
}

fn print_summary(plates: &[PlateInfo]) {
    println!();
    for plate in plates {
        let detail = match (&plate.slice_error, plate.prediction_seconds) {
            (Some(err), _) => err.red().to_string(),
            (None, Some(seconds)) => format!(
                "{}h{:02}m, {:.1} g",
                seconds / 3600,
                (seconds % 3600) / 60,
                plate.weight_grams.unwrap_or_default()
            ),
            (None, None) => "-".dimmed().to_string(),
        };
        println!("  plate {:<3} {}", plate.plate_index, detail);
    }
}
