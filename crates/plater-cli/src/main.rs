use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use plater_cli::commands;
use plater_cli::logging::init_logging;
use plater_infrastructure::{ConfigService, PlaterPaths};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "plater")]
#[command(about = "PLATER - multi-plate slice orchestration with streamed progress", long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/plater/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Listen address, overrides `server.bind`
        #[arg(long)]
        bind: Option<String>,
        /// Model manifest (default: ~/.config/plater/models.toml)
        #[arg(long)]
        models: Option<PathBuf>,
    },
    /// Slice a model in-process and print progress
    Slice {
        /// Model manifest
        #[arg(long)]
        models: PathBuf,
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Print the configuration fingerprint of a request
    Fingerprint {
        #[command(flatten)]
        request: RequestArgs,
    },
}

#[derive(Args)]
struct RequestArgs {
    /// File id as listed in the manifest
    #[arg(long)]
    file: String,
    /// Slice a single plate instead of all
    #[arg(long)]
    plate: Option<u32>,
    #[arg(long, default_value = "cool_plate")]
    build_plate: String,
    /// Filament mapping `<filament_index>:<slot>`, repeatable
    #[arg(long = "mapping")]
    mappings: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_service = match &cli.config {
        Some(path) => ConfigService::with_path(path),
        None => ConfigService::new(),
    };
    let mut config = config_service.get_config()?;

    match cli.command {
        Commands::Serve { bind, models } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            let log_dir = config.log_dir.clone().or_else(|| PlaterPaths::log_dir().ok());
            let _guard = init_logging(log_dir.as_deref(), "info")?;
            commands::serve::run(config, models).await?;
        }
        Commands::Slice { models, request } => {
            let _guard = init_logging(config.log_dir.as_deref(), "warn")?;
            let request = commands::build_request(
                &request.file,
                &request.build_plate,
                request.plate,
                &request.mappings,
            )?;
            commands::slice::run(config, &models, request).await?;
        }
        Commands::Fingerprint { request } => {
            commands::fingerprint::run(
                &request.file,
                &request.build_plate,
                request.plate,
                &request.mappings,
            )?;
        }
    }

    Ok(())
}
