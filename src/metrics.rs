//! Metric Aggregator Module
//!
//! Owns the process-wide Prometheus registry and folds parsed reports into
//! the three exported families:
//!
//! - `dmarc_passed_count`
//! - `dmarc_failed_count`
//! - `dmarc_last_processed_timestamp_seconds`
//!
//! every one labeled `(domain, provider, report_id, report_date)`. The domain
//! label is taken per record, so one report can touch several label keys.
//!
//! Ingestion is idempotent: a report identity (`org_name` + `report_id`)
//! already ingested is a no-op, guarding against the poller redelivering a
//! message after a mark-as-seen failure. The seen-set grows for the process
//! lifetime; report volumes are daily-granularity, so this is accepted.

use crate::models::ParsedReport;
use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

const LABEL_NAMES: [&str; 4] = ["domain", "provider", "report_id", "report_date"];

/// Result of handing one report to the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Counters were updated for `records` records.
    Ingested { records: usize },
    /// The report identity was already ingested; nothing changed.
    Duplicate,
}

pub struct Aggregator {
    registry: Registry,
    passed: IntCounterVec,
    failed: IntCounterVec,
    last_processed: GaugeVec,
    seen: Mutex<HashSet<(String, String)>>,
}

impl Aggregator {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let passed = IntCounterVec::new(
            Opts::new("dmarc_passed_count", "Number of emails that passed DMARC"),
            &LABEL_NAMES,
        )?;
        let failed = IntCounterVec::new(
            Opts::new("dmarc_failed_count", "Number of emails that failed DMARC"),
            &LABEL_NAMES,
        )?;
        let last_processed = GaugeVec::new(
            Opts::new(
                "dmarc_last_processed_timestamp_seconds",
                "Timestamp of last processed DMARC report",
            ),
            &LABEL_NAMES,
        )?;
        registry.register(Box::new(passed.clone()))?;
        registry.register(Box::new(failed.clone()))?;
        registry.register(Box::new(last_processed.clone()))?;
        Ok(Aggregator {
            registry,
            passed,
            failed,
            last_processed,
            seen: Mutex::new(HashSet::new()),
        })
    }

    /// Folds one report into the registry. Re-ingesting a previously seen
    /// report identity neither doubles the counters nor errors.
    pub fn ingest(&self, report: &ParsedReport) -> IngestOutcome {
        let identity = (report.org_name.clone(), report.report_id.clone());
        {
            let mut seen = self
                .seen
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !seen.insert(identity) {
                return IngestOutcome::Duplicate;
            }
        }

        let report_date = report.report_date();
        // Reports carry whole-second windows; the ingestion wall clock
        // supplies sub-second precision and wins whenever the report window
        // ended in the past.
        let observed = (report.date_range.end as f64).max(now_epoch());

        for record in &report.records {
            let labels = [
                record.domain.as_str(),
                report.org_name.as_str(),
                report.report_id.as_str(),
                report_date.as_str(),
            ];
            // Materialize all three families for the key up front so no
            // metric exists without the other two.
            let passed = self.passed.with_label_values(&labels);
            let failed = self.failed.with_label_values(&labels);
            let last = self.last_processed.with_label_values(&labels);

            if record.passed() {
                passed.inc_by(record.count);
            } else {
                failed.inc_by(record.count);
            }
            // The timestamp gauge only moves forward per key.
            if observed > last.get() {
                last.set(observed);
            }
        }

        IngestOutcome::Ingested {
            records: report.records.len(),
        }
    }

    /// Renders the current counter state in the Prometheus text exposition
    /// format.
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
