//! DMARC Exporter Library
//!
//! Core functionality for the exporter: configuration, error types, data
//! models, attachment extraction, DMARC XML parsing, metric aggregation, the
//! inbox poller, and the Prometheus metrics endpoint.

pub mod config;
pub mod error;
pub mod extract;
pub mod inbox;
pub mod metrics;
pub mod models;
pub mod parser;
pub mod server;

pub use config::{Config, Limits};
pub use extract::{extract, AttachmentKind};
pub use metrics::{Aggregator, IngestOutcome};
pub use parser::parse_report;
