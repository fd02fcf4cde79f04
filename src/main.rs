//! dmarc-exporter - Prometheus exporter for DMARC aggregate reports
//!
//! Polls an IMAP inbox for DMARC aggregate-report emails, extracts and parses
//! the XML payloads, and exposes the pass/fail counters on a Prometheus
//! scrape endpoint. One bad attachment never aborts a polling cycle.

mod config;
mod error;
mod extract;
mod inbox;
mod metrics;
mod models;
mod parser;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use extract::AttachmentKind;
use metrics::{Aggregator, IngestOutcome};
use models::RawAttachment;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// CLI arguments for the exporter.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Fetch, parse, and export Prometheus metrics from DMARC mail",
    long_about = "dmarc-exporter polls an IMAP inbox for DMARC aggregate reports, \
                  decompresses and parses the XML payloads, and republishes the \
                  authentication counters on a Prometheus scrape endpoint."
)]
struct Cli {
    /// Load specified configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let config = Config::load(&cli.config).context("Failed to load configuration")?;
    let aggregator = Arc::new(Aggregator::new().context("Failed to build metrics registry")?);

    let server = tokio::spawn(server::serve(config.prometheus.port, aggregator.clone()));

    log::info!(
        "Started dmarc-exporter. Polling {} every {}s, serving metrics on :{}",
        config.email.imap_server,
        config.prometheus.interval_secs,
        config.prometheus.port
    );

    let interval = Duration::from_secs(config.prometheus.interval_secs);
    let config = Arc::new(config);
    loop {
        let cycle_config = config.clone();
        let cycle_aggregator = aggregator.clone();
        // IMAP and MIME handling are synchronous; keep them off the runtime.
        let cycle = tokio::task::spawn_blocking(move || {
            run_cycle(&cycle_config, &cycle_aggregator);
        })
        .await;
        if let Err(err) = cycle {
            log::error!("Polling cycle panicked: {}", err);
        }
        if server.is_finished() {
            anyhow::bail!("Metrics endpoint terminated unexpectedly");
        }
        tokio::time::sleep(interval).await;
    }
}

/// One polling cycle: fetch attachments, then extract, parse, and aggregate
/// each to completion before considering the next.
fn run_cycle(config: &Config, aggregator: &Aggregator) {
    let attachments = match inbox::fetch_report_attachments(&config.email) {
        Ok(attachments) => attachments,
        Err(err) => {
            log::error!("Error retrieving emails: {:#}", err);
            return;
        }
    };
    for attachment in attachments {
        process_attachment(&attachment, config, aggregator);
    }
}

fn process_attachment(attachment: &RawAttachment, config: &Config, aggregator: &Aggregator) {
    let Some(kind) = AttachmentKind::from_filename(&attachment.filename) else {
        log::debug!("Skipping attachment {}: unrecognized format", attachment.filename);
        return;
    };
    let xml = match extract::extract(&attachment.data, kind, &config.limits) {
        Ok(xml) => xml,
        Err(err) => {
            log::warn!("Skipping attachment {}: {}", attachment.filename, err);
            return;
        }
    };
    let report = match parser::parse_report(&xml) {
        Ok(report) => report,
        Err(err) => {
            log::warn!("Skipping attachment {}: {}", attachment.filename, err);
            return;
        }
    };
    match aggregator.ingest(&report) {
        IngestOutcome::Ingested { records } => {
            log::info!(
                "Updated metrics - Provider: {}, Report ID: {}, Date: {}, Records: {}",
                report.org_name,
                report.report_id,
                report.report_date(),
                records
            );
        }
        IngestOutcome::Duplicate => {
            log::debug!(
                "Report {} from {} already ingested, skipping",
                report.report_id,
                report.org_name
            );
        }
    }
}
