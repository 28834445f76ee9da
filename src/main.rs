// =============================================================================
// main.rs - ONE BATCH, ONE DEADLINE, ONE JSON DUMP
// =============================================================================
//
// Reads sources from ADSTXT_SOURCES and the command line, fetches every
// ads.txt it can before the deadline, prints the documents as JSON on
// stdout, and complains on stderr about the ones that didn't show up.
// Ctrl+C counts as a deadline.
// =============================================================================

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use adstxt_engine::config::{Config, LogFormat};
use adstxt_engine::{fetch_all, missing_sources, FetchContext, FetchMetrics, HttpRetriever};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Pretty => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .init(),
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().with_extra_sources(std::env::args().skip(1));
    init_tracing(config.log_format);

    info!(
        sources = config.sources.len(),
        deadline_ms = config.deadline.as_millis() as u64,
        request_timeout_secs = config.request_timeout.as_secs(),
        "adstxt engine starting"
    );

    let retriever = Arc::new(
        HttpRetriever::from_config(&config).context("failed to build HTTP client")?,
    );
    let metrics = Arc::new(FetchMetrics::new());
    let ctx = FetchContext::with_timeout(config.deadline);

    let ctrl_c_token = ctx.cancellation_token();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; returning whatever has arrived");
            ctrl_c_token.cancel();
        }
    });

    let docs = fetch_all(&ctx, retriever, &config.sources, Arc::clone(&metrics)).await?;

    let missing = missing_sources(&config.sources, &docs);
    if !missing.is_empty() {
        warn!(count = missing.len(), "No response before the deadline");
        for source in &missing {
            warn!(source = *source, "missing");
        }
    }

    let json = serde_json::to_string_pretty(&docs).context("failed to serialize documents")?;
    println!("{}", json);

    let snapshot = metrics.snapshot();
    info!(
        requested = snapshot.sources_requested,
        collected = snapshot.documents_collected,
        failures = snapshot.retrieval_failures,
        deadline_hits = snapshot.deadline_hits,
        elapsed_ms = snapshot.uptime_ms,
        "adstxt engine done"
    );

    Ok(())
}
