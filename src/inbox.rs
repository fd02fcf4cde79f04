//! Inbox Poller Module
//!
//! Connects to the configured IMAP mailbox over TLS, fetches unseen messages,
//! and collects report attachments (`.zip`, `.gz`, `.xml`) from their MIME
//! parts. Messages are flagged `\Seen` once their attachments were handed
//! over, so a crash between fetch and flag redelivers the message on the next
//! cycle; the aggregator's idempotence absorbs that.

use crate::config::EmailConfig;
use crate::extract::AttachmentKind;
use crate::models::RawAttachment;
use anyhow::{Context, Result};
use mailparse::ParsedMail;

/// Fetches report attachments from all unseen messages in the configured
/// folder. One malformed message never aborts the cycle.
pub fn fetch_report_attachments(config: &EmailConfig) -> Result<Vec<RawAttachment>> {
    let tls = native_tls::TlsConnector::builder()
        .build()
        .context("Failed to build TLS connector")?;
    let client = imap::connect(
        (config.imap_server.as_str(), config.port),
        &config.imap_server,
        &tls,
    )
    .with_context(|| format!("Failed to connect to {}:{}", config.imap_server, config.port))?;
    let mut session = client
        .login(&config.username, &config.password)
        .map_err(|(err, _)| err)
        .context("IMAP login failed")?;

    session
        .select(&config.folder)
        .with_context(|| format!("Failed to select folder {}", config.folder))?;

    let unseen = session.search("UNSEEN").context("UNSEEN search failed")?;
    log::debug!("{} unseen message(s) in {}", unseen.len(), config.folder);

    let mut attachments = Vec::new();
    for seq in unseen {
        let messages = session
            .fetch(seq.to_string(), "RFC822")
            .with_context(|| format!("Failed to fetch message {}", seq))?;
        for message in messages.iter() {
            let Some(body) = message.body() else {
                continue;
            };
            match collect_attachments(body) {
                Ok(mut found) => attachments.append(&mut found),
                Err(err) => log::warn!("Skipping unparsable message {}: {:#}", seq, err),
            }
        }
        if let Err(err) = session.store(seq.to_string(), "+FLAGS (\\Seen)") {
            log::warn!("Failed to flag message {} as seen: {}", seq, err);
        }
    }

    if let Err(err) = session.logout() {
        log::debug!("IMAP logout failed: {}", err);
    }
    Ok(attachments)
}

/// Walks the MIME tree of one raw message and returns every part whose
/// filename classifies as a report attachment.
pub fn collect_attachments(raw: &[u8]) -> Result<Vec<RawAttachment>> {
    let mail = mailparse::parse_mail(raw).context("Failed to parse message")?;
    let mut out = Vec::new();
    collect_from_part(&mail, &mut out)?;
    Ok(out)
}

fn collect_from_part(part: &ParsedMail, out: &mut Vec<RawAttachment>) -> Result<()> {
    for sub in &part.subparts {
        collect_from_part(sub, out)?;
    }

    let disposition = part.get_content_disposition();
    let filename = disposition
        .params
        .get("filename")
        .cloned()
        .or_else(|| part.ctype.params.get("name").cloned());
    let Some(filename) = filename else {
        return Ok(());
    };

    // Unrecognized attachment formats are a skip, not an error.
    if AttachmentKind::from_filename(&filename).is_none() {
        log::debug!("Ignoring attachment with unrecognized format: {}", filename);
        return Ok(());
    }

    let data = part
        .get_body_raw()
        .with_context(|| format!("Failed to decode attachment body: {}", filename))?;
    out.push(RawAttachment { filename, data });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_with_attachment(filename: &str, payload_b64: &str) -> Vec<u8> {
        format!(
            "From: noreply-dmarc-support@google.com\r\n\
             To: dmarc-reports@example.com\r\n\
             Subject: Report domain: example.com\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: multipart/mixed; boundary=\"b1\"\r\n\
             \r\n\
             --b1\r\n\
             Content-Type: text/plain\r\n\
             \r\n\
             Attached.\r\n\
             --b1\r\n\
             Content-Type: application/zip; name=\"{filename}\"\r\n\
             Content-Disposition: attachment; filename=\"{filename}\"\r\n\
             Content-Transfer-Encoding: base64\r\n\
             \r\n\
             {payload_b64}\r\n\
             --b1--\r\n"
        )
        .into_bytes()
    }

    #[test]
    fn test_collects_named_report_attachment() {
        // "PGZlZWRiYWNrLz4=" is base64 for "<feedback/>".
        let raw = message_with_attachment("google.com!example.com.xml", "PGZlZWRiYWNrLz4=");
        let attachments = collect_attachments(&raw).unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename, "google.com!example.com.xml");
        assert_eq!(attachments[0].data, b"<feedback/>");
    }

    #[test]
    fn test_unrecognized_attachment_skipped() {
        let raw = message_with_attachment("invoice.pdf", "PGZlZWRiYWNrLz4=");
        let attachments = collect_attachments(&raw).unwrap();
        assert!(attachments.is_empty());
    }

    #[test]
    fn test_message_without_attachments() {
        let raw = b"From: a@example.com\r\nSubject: hi\r\n\r\nplain body\r\n";
        let attachments = collect_attachments(raw).unwrap();
        assert!(attachments.is_empty());
    }
}
