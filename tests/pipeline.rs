//! End-to-end pipeline tests: attachment bytes -> extraction -> parsing ->
//! aggregation -> rendered exposition, the way a polling cycle drives them.

use dmarc_exporter::models::RawAttachment;
use dmarc_exporter::{extract, parse_report, Aggregator, AttachmentKind, IngestOutcome, Limits};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const SCENARIO_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feedback>
  <report_metadata>
    <org_name>Google</org_name>
    <email>noreply-dmarc-support@google.com</email>
    <report_id>123456789</report_id>
    <date_range><begin>1739836800</begin><end>1739923199</end></date_range>
  </report_metadata>
  <policy_published>
    <domain>example.com</domain>
    <p>quarantine</p>
  </policy_published>
  <record>
    <row>
      <source_ip>203.0.113.7</source_ip>
      <count>500</count>
      <policy_evaluated>
        <disposition>none</disposition>
        <dkim>pass</dkim>
        <spf>pass</spf>
      </policy_evaluated>
    </row>
    <identifiers><header_from>example.com</header_from></identifiers>
  </record>
  <record>
    <row>
      <source_ip>198.51.100.9</source_ip>
      <count>20</count>
      <policy_evaluated>
        <disposition>reject</disposition>
        <dkim>fail</dkim>
        <spf>fail</spf>
      </policy_evaluated>
    </row>
    <identifiers><header_from>example.com</header_from></identifiers>
  </record>
</feedback>"#;

fn zip_blob(entry_name: &str, data: &[u8]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(entry_name, SimpleFileOptions::default())
        .unwrap();
    writer.write_all(data).unwrap();
    writer.finish().unwrap().into_inner()
}

fn gzip_blob(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn metric_value(rendered: &str, family: &str, labels: &[(&str, &str)]) -> Option<f64> {
    for line in rendered.lines() {
        if !line.starts_with(family) || line.starts_with('#') {
            continue;
        }
        if labels
            .iter()
            .all(|(k, v)| line.contains(&format!("{}=\"{}\"", k, v)))
        {
            return line.rsplit(' ').next().and_then(|v| v.parse().ok());
        }
    }
    None
}

const SCENARIO_LABELS: [(&str, &str); 4] = [
    ("domain", "example.com"),
    ("provider", "Google"),
    ("report_id", "123456789"),
    ("report_date", "2025-02-18"),
];

#[test]
fn zip_and_gzip_recover_identical_xml() {
    let limits = Limits::default();
    let via_zip = extract(
        &zip_blob("google.com!example.com.xml", SCENARIO_XML.as_bytes()),
        AttachmentKind::Zip,
        &limits,
    )
    .unwrap();
    let via_gzip = extract(
        &gzip_blob(SCENARIO_XML.as_bytes()),
        AttachmentKind::Gzip,
        &limits,
    )
    .unwrap();
    assert_eq!(via_zip, SCENARIO_XML.as_bytes());
    assert_eq!(via_gzip, SCENARIO_XML.as_bytes());
}

#[test]
fn scenario_counts_exposed() {
    let limits = Limits::default();
    let aggregator = Aggregator::new().unwrap();

    let attachment = RawAttachment {
        filename: "google.com!example.com!1739836800!1739923199.zip".to_string(),
        data: zip_blob("report.xml", SCENARIO_XML.as_bytes()),
    };
    let kind = AttachmentKind::from_filename(&attachment.filename).unwrap();
    let xml = extract(&attachment.data, kind, &limits).unwrap();
    let report = parse_report(&xml).unwrap();
    assert_eq!(
        aggregator.ingest(&report),
        IngestOutcome::Ingested { records: 2 }
    );

    let rendered = aggregator.render().unwrap();
    assert_eq!(
        metric_value(&rendered, "dmarc_passed_count", &SCENARIO_LABELS),
        Some(500.0)
    );
    assert_eq!(
        metric_value(&rendered, "dmarc_failed_count", &SCENARIO_LABELS),
        Some(20.0)
    );
    assert!(
        metric_value(
            &rendered,
            "dmarc_last_processed_timestamp_seconds",
            &SCENARIO_LABELS
        )
        .is_some()
    );
}

#[test]
fn redelivered_attachment_does_not_double_count() {
    let limits = Limits::default();
    let aggregator = Aggregator::new().unwrap();

    // Same report delivered twice, once zipped and once gzipped, as happens
    // when a mark-as-seen failure makes the poller refetch the message.
    let first = extract(
        &zip_blob("report.xml", SCENARIO_XML.as_bytes()),
        AttachmentKind::Zip,
        &limits,
    )
    .unwrap();
    let second = extract(
        &gzip_blob(SCENARIO_XML.as_bytes()),
        AttachmentKind::Gzip,
        &limits,
    )
    .unwrap();

    assert!(matches!(
        aggregator.ingest(&parse_report(&first).unwrap()),
        IngestOutcome::Ingested { .. }
    ));
    assert_eq!(
        aggregator.ingest(&parse_report(&second).unwrap()),
        IngestOutcome::Duplicate
    );

    let rendered = aggregator.render().unwrap();
    assert_eq!(
        metric_value(&rendered, "dmarc_passed_count", &SCENARIO_LABELS),
        Some(500.0)
    );
    assert_eq!(
        metric_value(&rendered, "dmarc_failed_count", &SCENARIO_LABELS),
        Some(20.0)
    );
}

#[test]
fn bad_attachment_is_isolated() {
    let limits = Limits::default();
    let aggregator = Aggregator::new().unwrap();

    // A corrupt archive fails extraction without touching the registry...
    assert!(extract(b"garbage", AttachmentKind::Zip, &limits).is_err());
    // ...and the next attachment still aggregates normally.
    let xml = extract(
        &gzip_blob(SCENARIO_XML.as_bytes()),
        AttachmentKind::Gzip,
        &limits,
    )
    .unwrap();
    aggregator.ingest(&parse_report(&xml).unwrap());
    let rendered = aggregator.render().unwrap();
    assert_eq!(
        metric_value(&rendered, "dmarc_passed_count", &SCENARIO_LABELS),
        Some(500.0)
    );
}

#[test]
fn unrecognized_format_is_a_skip() {
    assert_eq!(AttachmentKind::from_filename("report.7z"), None);
    assert_eq!(AttachmentKind::from_filename("signature.asc"), None);
}

#[tokio::test]
async fn metrics_endpoint_serves_exposition() {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    let limits = Limits::default();
    let aggregator = std::sync::Arc::new(Aggregator::new().unwrap());
    let xml = extract(
        &gzip_blob(SCENARIO_XML.as_bytes()),
        AttachmentKind::Gzip,
        &limits,
    )
    .unwrap();
    aggregator.ingest(&parse_report(&xml).unwrap());

    let app = dmarc_exporter::server::router(aggregator);
    let response = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let rendered = String::from_utf8(body.to_vec()).unwrap();
    assert_eq!(
        metric_value(&rendered, "dmarc_passed_count", &SCENARIO_LABELS),
        Some(500.0)
    );
}
