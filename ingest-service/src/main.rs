//! Ingest service entry point.
//!
//! Scans the source directory once, pushes new articles through the
//! pipeline into the archive and prints a run summary. The first Ctrl-C
//! drains in-flight documents; a second one aborts them.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ingest_pipeline::{bounded, RunSummary, ShutdownHandle, TriageFilter};
use ingest_service::{Dependencies, DirectoryProducer, ProducerReport, ServiceConfig, ServiceError};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_tracing();

    match run().await {
        Ok(failed) if failed == 0 => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %e, "Ingest service failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Returns the number of failed documents.
async fn run() -> Result<usize, ServiceError> {
    let config = ServiceConfig::from_env()?;
    let deps = Dependencies::new(&config).await?;

    let orchestrator = Arc::new(deps.orchestrator);
    let shutdown = orchestrator.shutdown_handle();
    tokio::spawn(watch_signals(shutdown.clone()));

    let (producer, consumer) = bounded(config.queue_capacity)?;

    let running = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run(consumer).await })
    };

    let report = DirectoryProducer::from_config(&config)
        .run(&producer, deps.dedup.as_ref(), &shutdown)
        .await;

    // Closing intake lets the workers finish once the queue is drained
    drop(producer);

    let summary = running
        .await
        .map_err(|e| ingest_pipeline::PipelineError::worker(e.to_string()))??;
    let report = report?;

    print_summary(&report, &summary);

    for entry in orchestrator.outcomes().triage(TriageFilter::All) {
        warn!(
            document_id = %entry.document.document_id,
            state = %entry.state,
            reason = ?entry.reason.as_ref().map(ToString::to_string),
            retryable = entry.retryable,
            "Needs review"
        );
    }

    Ok(summary.stats.failed)
}

/// First Ctrl-C drains, the second hard-stops.
async fn watch_signals(shutdown: ShutdownHandle) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    info!("Received shutdown signal, draining");
    shutdown.drain();

    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    info!("Received second shutdown signal, stopping");
    shutdown.hard_stop();
}

fn print_summary(report: &ProducerReport, summary: &RunSummary) {
    let seconds = summary.duration_ms as f64 / 1000.0;

    println!();
    println!("{}", "=".repeat(60));
    println!("Ingest run complete");
    println!("{}", "=".repeat(60));
    println!("Found:            {}", report.found);
    println!("Already present:  {}", report.already_present);
    println!("Unreadable:       {}", report.unreadable);
    println!("Enqueued:         {}", report.enqueued);
    println!();
    println!("Committed:        {}", summary.stats.committed);
    println!(
        "Rejected:         {} ({} duplicates)",
        summary.stats.rejected, summary.stats.duplicates
    );
    println!("Quarantined:      {}", summary.stats.quarantined);
    println!("Failed:           {}", summary.stats.failed);
    if seconds > 0.0 {
        println!(
            "Time:             {:.1}s ({:.1} documents/sec)",
            seconds,
            summary.stats.total() as f64 / seconds
        );
    }
}
