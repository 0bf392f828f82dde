//! stepcast CLI - iterative forecasts from a CSV file and a model manifest

use clap::{Parser, Subcommand, ValueEnum};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use stepcast::jobs::MemoryJobStore;
use stepcast::store::{DirectoryModelStore, ModelStore};
use stepcast::{
    ConfidenceLevel, DataLoader, EngineSettings, ForecastConfig, ForecastError, ForecastInterval,
    ForecastOutput, ForecastRequest, ForecastService, Result,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "stepcast")]
#[command(about = "Iterative time series forecasts with confidence bands")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Forecast a column of a CSV file
    Forecast {
        /// CSV file with a date column and the target column
        #[arg(long, value_name = "CSV")]
        data: PathBuf,

        /// Model manifest (JSON)
        #[arg(long, value_name = "MANIFEST")]
        model: PathBuf,

        /// Column to forecast; defaults to the model's target column
        #[arg(long, default_value = "")]
        target: String,

        /// Number of steps
        #[arg(long, default_value_t = 10)]
        horizon: usize,

        /// hour, day, week or month
        #[arg(long, default_value = "day")]
        interval: ForecastInterval,

        /// 90, 95 or 99
        #[arg(long, default_value_t = 95.0)]
        confidence: f64,

        /// Engine settings (JSON)
        #[arg(long, env = "STEPCAST_SETTINGS")]
        settings: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "json")]
        output: OutputFormat,
    },
    /// List model manifests in a directory
    Models {
        /// Directory holding `*.json` manifests
        #[arg(long, default_value = "models", env = "STEPCAST_MODELS_DIR")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Forecast {
            data,
            model,
            target,
            horizon,
            interval,
            confidence,
            settings,
            output,
        } => {
            let settings = match settings {
                Some(path) => EngineSettings::from_json_file(path)?,
                None => EngineSettings::default(),
            };
            let config =
                ForecastConfig::new(horizon, interval, ConfidenceLevel::from_percent(confidence))?;

            let (dir, name) = split_manifest_path(&model)?;
            let service = ForecastService::new(
                Arc::new(DirectoryModelStore::new(dir)),
                Arc::new(MemoryJobStore::new()),
                settings,
            );

            let frame = DataLoader::from_csv(&data)?;
            info!("Loaded {} rows from {}", frame.len(), data.display());

            let request = ForecastRequest::new(name, target, config);
            let result = service.forecast(&request, &frame)?;

            match output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
                OutputFormat::Csv => write_csv(&result)?,
            }
            Ok(())
        }
        Commands::Models { dir } => {
            let store = DirectoryModelStore::new(&dir);
            for name in store.list()? {
                match store.load_artifact(&name) {
                    Ok(artifact) => println!(
                        "{}\t{} features\t{}",
                        name,
                        artifact.feature_names().len(),
                        artifact.metadata().model_type.as_deref().unwrap_or("-")
                    ),
                    Err(e) => println!("{}\tinvalid: {}", name, e),
                }
            }
            Ok(())
        }
    }
}

fn split_manifest_path(path: &Path) -> Result<(PathBuf, String)> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            ForecastError::InvalidParameter(format!("Invalid model path {}", path.display()))
        })?
        .to_string();
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((dir, name))
}

fn write_csv(result: &ForecastOutput) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    for row in &result.rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
