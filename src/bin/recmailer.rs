use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use recmailer::api::{self, AppState};
use recmailer::{Config, Error, RecProcessorFactory, Renderer, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Batch recommendation mailer
#[derive(Debug, Parser)]
#[command(name = "recmailer", version, about)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, default_value = "recmailer.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Process one batch and exit
    Run {
        /// CSV file of `subject_id,address` rows
        #[arg(short, long)]
        data: PathBuf,
        /// Message template
        #[arg(short, long)]
        template: PathBuf,
    },
    /// Serve the trigger API
    Serve {
        /// CSV file used for triggered runs (overrides Api.DataFile)
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// Message template (overrides Api.TemplateFile)
        #[arg(short, long)]
        template: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "recmailer failed");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.config)?;
    let cancel = CancellationToken::new();
    tokio::spawn(recmailer::cancel_on_signal(cancel.clone()));

    match cli.command {
        Command::Run { data, template } => {
            let summary = recmailer::run_batch(config, &data, &template, &cancel).await?;
            println!(
                "Sent {} messages in {} seconds ({} succeeded, {} failed)",
                summary.total_processed,
                summary.elapsed_seconds,
                summary.succeeded,
                summary.failed
            );
            Ok(())
        }
        Command::Serve { data, template } => {
            let template = template
                .or_else(|| config.api.template_file.clone())
                .ok_or_else(|| Error::config("Api.TemplateFile", "no template configured"))?;
            let renderer = Arc::new(Renderer::from_file(&template)?);

            let config = Arc::new(config);
            let pipeline = RecProcessorFactory::new(Arc::clone(&config), renderer).into_pipeline();

            let mut state = AppState::new(config, pipeline, cancel)?;
            if let Some(data) = data {
                state = state.with_data_file(data);
            }

            api::start_api_server(state).await
        }
    }
}
