//! Data Models Module
//!
//! Core data structures for decoded DMARC aggregate reports: the report
//! itself, its per-record rows, and the policy-evaluated verdict and
//! disposition enums with string conversions.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A raw attachment pulled from the inbox, consumed once by the extractor.
#[derive(Debug, Clone)]
pub struct RawAttachment {
    pub filename: String,
    pub data: Vec<u8>,
}

/// One decoded DMARC aggregate report.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ParsedReport {
    /// Reporting provider, e.g. "google.com". Defaults to "Unknown".
    pub org_name: String,
    /// Globally unique per sending organization; the de-duplication key.
    pub report_id: String,
    pub date_range: DateRange,
    /// One entry per `<record>` block, in document order.
    pub records: Vec<ReportRecord>,
}

impl ParsedReport {
    /// Calendar date of the report window start, used as the
    /// `report_date` metric label.
    pub fn report_date(&self) -> String {
        use chrono::TimeZone;
        chrono::Utc
            .timestamp_opt(self.date_range.begin, 0)
            .single()
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct DateRange {
    pub begin: i64,
    pub end: i64,
}

/// One `<record>` row with its policy-evaluated results.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReportRecord {
    pub source_ip: String,
    pub count: u64,
    pub disposition: Disposition,
    /// Authenticated domain (header From), per record: a single report can
    /// cover several domains.
    pub domain: String,
    pub dkim: Verdict,
    pub spf: Verdict,
}

impl ReportRecord {
    /// DMARC alignment: the record passed if either policy-evaluated
    /// mechanism aligned, regardless of the raw signature results.
    pub fn passed(&self) -> bool {
        self.dkim == Verdict::Pass || self.spf == Verdict::Pass
    }
}

impl Default for ReportRecord {
    fn default() -> Self {
        ReportRecord {
            source_ip: "unknown".to_string(),
            count: 0,
            disposition: Disposition::None,
            domain: "unknown".to_string(),
            dkim: Verdict::None,
            spf: Verdict::None,
        }
    }
}

/// Policy-evaluated DKIM/SPF result.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub enum Verdict {
    #[default]
    None,
    Pass,
    Fail,
}

/// Receiver policy action, distinct from pass/fail classification.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub enum Disposition {
    #[default]
    None,
    Quarantine,
    Reject,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::None => write!(f, "none"),
            Verdict::Pass => write!(f, "pass"),
            Verdict::Fail => write!(f, "fail"),
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::None => write!(f, "none"),
            Disposition::Quarantine => write!(f, "quarantine"),
            Disposition::Reject => write!(f, "reject"),
        }
    }
}

impl FromStr for Verdict {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pass" => Ok(Verdict::Pass),
            "fail" => Ok(Verdict::Fail),
            "none" => Ok(Verdict::None),
            _ => Err(format!("Invalid verdict: {}", s)),
        }
    }
}

impl FromStr for Disposition {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Disposition::None),
            "quarantine" => Ok(Disposition::Quarantine),
            "reject" => Ok(Disposition::Reject),
            _ => Err(format!("Invalid disposition: {}", s)),
        }
    }
}
