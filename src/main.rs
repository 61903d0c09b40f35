//! Triage pipeline entrypoint: fetch tickets and catalog, classify, report.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use ticket_triage::{
    AppConfig, BatchCoordinator, CatalogClient, ClassificationEngine, HelpdeskClient, OpenAiClient,
};

#[derive(Parser, Debug)]
#[command(name = "ticket-triage", about = "Classify IT helpdesk tickets against a service catalog")]
struct Cli {
    /// Write the report to this path instead of the configured default.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,

    /// Only validate configuration without running the pipeline.
    #[arg(long)]
    validate_only: bool,

    /// Override the maximum number of concurrent classifications.
    #[arg(long)]
    max_concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let mut config = AppConfig::from_env();
    if let Some(max_concurrency) = cli.max_concurrency {
        config.coordinator.max_concurrency = max_concurrency;
    }
    if let Some(output) = &cli.output {
        if let Some(parent) = output.parent() {
            config.output.output_dir = parent.to_path_buf();
        }
        if let Some(name) = output.file_name() {
            config.output.report_filename = name.to_string_lossy().into_owned();
        }
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("Configuration error: {error}");
        }
        return ExitCode::FAILURE;
    }
    if cli.validate_only {
        println!("Configuration is valid");
        return ExitCode::SUCCESS;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Pipeline failed");
            eprintln!("Pipeline failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig) -> ticket_triage::Result<()> {
    let helpdesk = HelpdeskClient::new(config.api.clone())?;
    let catalog_client = CatalogClient::new(config.api.clone())?;

    let (tickets, catalog) =
        tokio::try_join!(helpdesk.fetch_tickets(), catalog_client.fetch_catalog())?;

    if tickets.is_empty() {
        tracing::info!("No open tickets, nothing to classify");
        return Ok(());
    }

    let engine = ClassificationEngine::new(
        OpenAiClient::new(&config.llm),
        Arc::new(catalog),
        config.engine.clone(),
    );
    let coordinator = Arc::new(BatchCoordinator::new(engine, config.coordinator.clone()));

    // Ctrl-C cancels in-flight work; completed classifications are kept and
    // the report is still written.
    let cancel = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling remaining classifications");
            cancel.cancel();
        }
    });

    let mut progress = coordinator.progress();
    tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let snapshot = *progress.borrow();
            tracing::info!(
                completed = snapshot.completed,
                total = snapshot.total,
                fallbacks = snapshot.fallbacks,
                "Batch progress"
            );
        }
    });

    let outcome = coordinator.classify_batch(tickets.clone()).await;

    let report_path = config.output.report_path();
    let rows = ticket_triage::report::write_report(&tickets, &outcome.records, &report_path)?;

    tracing::info!(
        rows = rows,
        fallbacks = outcome.fallback_count,
        cancelled = outcome.cancelled,
        path = %report_path.display(),
        "Triage run complete"
    );

    // The report above still has one row per ticket, but a batch where
    // nothing classified means the inference endpoint was unreachable.
    if outcome.all_failed() {
        return Err(ticket_triage::TriageError::Other(anyhow::anyhow!(
            "all {} tickets failed classification; check the inference endpoint",
            outcome.records.len()
        )));
    }
    Ok(())
}
