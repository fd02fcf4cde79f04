//! Report Parser Module
//!
//! Decodes DMARC aggregate-report XML into a [`ParsedReport`]. Element lookup
//! goes through local names only, so a default or prefixed namespace
//! declaration never changes the result (some senders omit or mangle the
//! declaration entirely). DOCTYPE blocks are removed before parsing and
//! rejected outright when they define two or more entities, and nesting depth
//! is capped, which covers XXE and Billion Laughs style inputs.
//!
//! Missing record fields fall back to sentinels instead of failing the whole
//! document: `source_ip` -> "unknown", `count` -> 0, `domain` -> the published
//! policy domain or "unknown", disposition and verdicts -> none. Only a
//! missing `report_id` is fatal.

use crate::error::ParseError;
use crate::models::{DateRange, ParsedReport, ReportRecord};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

const MAX_DEPTH: u32 = 20;

/// Parses DMARC aggregate-report XML bytes into a structured report.
///
/// # Errors
///
/// Returns an error if the XML cannot be parsed, if the nesting depth limit
/// is exceeded, if a DOCTYPE block defines two or more entities, or if the
/// report carries no `report_id`.
pub fn parse_report(xml: &[u8]) -> Result<ParsedReport, ParseError> {
    let text = String::from_utf8_lossy(xml);
    let cleaned = strip_doctype(&text)?;

    let mut reader = Reader::from_str(&cleaned);
    reader.config_mut().trim_text(true);

    let mut org_name = String::new();
    let mut report_id = String::new();
    let mut date_range = DateRange::default();
    let mut policy_domain = String::new();
    let mut records = Vec::new();
    let mut depth: u32 = 0;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                depth += 1;
                if depth > MAX_DEPTH {
                    return Err(ParseError::Rejected(
                        "XML nesting depth limit exceeded".to_string(),
                    ));
                }
                match e.local_name().as_ref() {
                    b"report_metadata" => {
                        (org_name, report_id, date_range) = parse_metadata(&mut reader)?;
                        depth = depth.saturating_sub(1);
                    }
                    b"policy_published" => {
                        policy_domain = parse_policy_domain(&mut reader)?;
                        depth = depth.saturating_sub(1);
                    }
                    b"record" => {
                        records.push(parse_record(&mut reader)?);
                        depth = depth.saturating_sub(1);
                    }
                    _ => {}
                }
            }
            Ok(Event::End(_)) => {
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::MalformedXml(e)),
            _ => {}
        }
    }

    if report_id.trim().is_empty() {
        return Err(ParseError::MissingIdentifier);
    }
    if org_name.trim().is_empty() {
        org_name = "Unknown".to_string();
    }

    // A record without its own header_from inherits the published policy
    // domain; only when both are absent does the sentinel survive.
    for record in &mut records {
        if record.domain == "unknown" && !policy_domain.trim().is_empty() {
            record.domain = policy_domain.clone();
        }
    }

    Ok(ParsedReport {
        org_name,
        report_id,
        date_range,
        records,
    })
}

/// Removes any DOCTYPE block before parsing. Two or more entity definitions
/// reject the document.
fn strip_doctype(xml: &str) -> Result<String, ParseError> {
    let Some(start) = xml.find("<!DOCTYPE") else {
        return Ok(xml.to_string());
    };
    let Some(end) = xml[start..].find("]>") else {
        return Ok(xml.to_string());
    };
    let doctype = &xml[start..start + end + 2];
    if doctype.matches("<!ENTITY").count() >= 2 {
        return Err(ParseError::Rejected(
            "Recursive entities detected".to_string(),
        ));
    }
    Ok(format!("{}{}", &xml[..start], &xml[start + end + 2..]))
}

fn read_trimmed(reader: &mut Reader<&[u8]>, e: &BytesStart) -> Result<String, ParseError> {
    Ok(reader.read_text(e.name())?.trim().to_string())
}

/// Parses `<report_metadata>`: (org_name, report_id, date_range).
fn parse_metadata(reader: &mut Reader<&[u8]>) -> Result<(String, String, DateRange), ParseError> {
    let mut org_name = String::new();
    let mut report_id = String::new();
    let mut date_range = DateRange::default();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"org_name" => {
                    org_name = read_trimmed(reader, e)?;
                }
                b"report_id" => {
                    report_id = read_trimmed(reader, e)?;
                }
                b"begin" => {
                    date_range.begin = read_trimmed(reader, e)?.parse().unwrap_or(0);
                }
                b"end" => {
                    date_range.end = read_trimmed(reader, e)?.parse().unwrap_or(0);
                }
                _ => {}
            },
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"report_metadata" => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::MalformedXml(e)),
            _ => {}
        }
    }
    Ok((org_name, report_id, date_range))
}

/// Parses `<policy_published>`, keeping only the domain (used as the
/// fallback when a record lacks its own header_from).
fn parse_policy_domain(reader: &mut Reader<&[u8]>) -> Result<String, ParseError> {
    let mut domain = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if e.local_name().as_ref() == b"domain" {
                    domain = read_trimmed(reader, e)?;
                }
            }
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"policy_published" => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::MalformedXml(e)),
            _ => {}
        }
    }
    Ok(domain)
}

/// Parses one `<record>` element. The policy-evaluated `<dkim>`/`<spf>`
/// verdicts drive pass/fail classification; the raw `<auth_results>` subtree
/// is skipped so its identically named elements cannot shadow them.
fn parse_record(reader: &mut Reader<&[u8]>) -> Result<ReportRecord, ParseError> {
    let mut record = ReportRecord::default();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"auth_results" => {
                    let end = e.to_end().into_owned();
                    reader.read_to_end(end.name())?;
                }
                b"source_ip" => {
                    let text = read_trimmed(reader, e)?;
                    if !text.is_empty() {
                        record.source_ip = text;
                    }
                }
                b"count" => {
                    record.count = parse_count(&read_trimmed(reader, e)?);
                }
                b"disposition" => {
                    record.disposition = read_trimmed(reader, e)?.parse().unwrap_or_default();
                }
                b"dkim" => {
                    record.dkim = read_trimmed(reader, e)?.parse().unwrap_or_default();
                }
                b"spf" => {
                    record.spf = read_trimmed(reader, e)?.parse().unwrap_or_default();
                }
                b"header_from" => {
                    let text = read_trimmed(reader, e)?;
                    if !text.is_empty() {
                        record.domain = text;
                    }
                }
                _ => {}
            },
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"record" => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::MalformedXml(e)),
            _ => {}
        }
    }
    Ok(record)
}

/// Non-negative integer coercion: non-numeric or negative counts become 0,
/// and the record still participates in classification with zero weight.
fn parse_count(text: &str) -> u64 {
    text.parse::<i64>()
        .ok()
        .filter(|n| *n >= 0)
        .map(|n| n as u64)
        .unwrap_or(0)
}
