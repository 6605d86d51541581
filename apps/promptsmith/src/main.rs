use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use inference::HttpEngineConnector;
use session_core::{GenerationOutcome, SessionController};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod config;
mod presenter;

use config::load_settings;

/// Expand short keywords into image-generator prompts using a local model.
#[derive(Parser, Debug)]
struct Args {
    /// Config file; defaults to ./promptsmith.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// OpenAI-compatible inference server, e.g. http://127.0.0.1:8080/v1
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long)]
    model: Option<String>,
    /// Keyword to expand. Without one, keywords are read line by line from stdin.
    keyword: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(base_url) = args.base_url {
        settings.base_url = base_url;
    }
    if let Some(model) = args.model {
        settings.model_id = model;
    }

    let connector = HttpEngineConnector::new(&settings.base_url, settings.request_timeout())
        .context("failed to configure inference engine connector")?;
    let controller = SessionController::new(settings.profile(), Arc::new(connector))
        .with_retry_policy(settings.retry_policy);
    info!(
        session_id = %controller.session_id(),
        model_id = %settings.model_id,
        base_url = %settings.base_url,
        retry_policy = %settings.retry_policy,
        "session started"
    );

    let presenter = presenter::spawn(
        controller.subscribe_events(),
        Box::pin(controller.load_progress()),
        std::io::stderr(),
    );

    let result = if args.keyword.is_empty() {
        run_interactive(&controller).await
    } else {
        run_once(&controller, &args.keyword.join(" ")).await
    };

    // Closing the controller's channels lets the presenter drain what is
    // queued and exit on its own.
    drop(controller);
    if let Err(err) = presenter.await {
        debug!(error = %err, "presenter task ended abnormally");
    }
    result
}

/// Failures were already rendered by the presenter; only the exit code
/// reflects them here.
async fn run_once(controller: &SessionController, keyword: &str) -> Result<ExitCode> {
    let outcome = controller.request_load_and_generate(keyword).await?;
    print_outcome(&outcome);
    Ok(match outcome {
        GenerationOutcome::Failed(_) | GenerationOutcome::LoadFailed(_) => ExitCode::FAILURE,
        GenerationOutcome::Completed(_) | GenerationOutcome::Skipped => ExitCode::SUCCESS,
    })
}

async fn run_interactive(controller: &SessionController) -> Result<ExitCode> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let outcome = controller.request_load_and_generate(&line).await?;
        print_outcome(&outcome);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_outcome(outcome: &GenerationOutcome) {
    if let GenerationOutcome::Completed(text) = outcome {
        println!("{text}");
    }
}
