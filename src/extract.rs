//! Archive Extractor Module
//!
//! Turns a raw report attachment (ZIP, GZIP, or plain XML) into the embedded
//! XML document bytes. Enforces decompression hardening: declared-size and
//! decompressed-size limits, entry count, compression ratio, entry name
//! length, and path traversal prevention for ZIP archives.
use crate::config::Limits;
use crate::error::ExtractError;
use flate2::read::GzDecoder;
use std::io::{Cursor, Read};
use zip::ZipArchive;

/// Declared compression of an attachment, classified from its filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Zip,
    Gzip,
    Xml,
}

impl AttachmentKind {
    /// Classifies an attachment by filename extension. `None` means the
    /// attachment is not a report candidate and should be skipped.
    pub fn from_filename(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Some(AttachmentKind::Zip)
        } else if lower.ends_with(".gz") {
            Some(AttachmentKind::Gzip)
        } else if lower.ends_with(".xml") {
            Some(AttachmentKind::Xml)
        } else {
            None
        }
    }
}

/// Extracts the XML document from an attachment blob.
///
/// Pure transform with no side effects; errors are meant to be logged by the
/// caller and the attachment skipped.
pub fn extract(blob: &[u8], kind: AttachmentKind, limits: &Limits) -> Result<Vec<u8>, ExtractError> {
    if blob.len() > limits.max_file_size {
        return Err(ExtractError::TooLarge(format!(
            "Attachment size {} bytes exceeds limit of {} bytes",
            blob.len(),
            limits.max_file_size
        )));
    }
    match kind {
        AttachmentKind::Zip => extract_zip(blob, limits),
        AttachmentKind::Gzip => extract_gzip(blob, limits),
        AttachmentKind::Xml => Ok(blob.to_vec()),
    }
}

/// Returns the first entry (archive order) with an XML-like name.
/// Providers vary in their conventions; first-in-archive-order is the
/// tie-break when several entries qualify.
fn extract_zip(blob: &[u8], limits: &Limits) -> Result<Vec<u8>, ExtractError> {
    let mut archive = ZipArchive::new(Cursor::new(blob))
        .map_err(|e| ExtractError::CorruptArchive(e.to_string()))?;
    if archive.len() > limits.max_entries_in_zip {
        return Err(ExtractError::UnsupportedFormat(format!(
            "Too many entries in archive: {}",
            archive.len()
        )));
    }
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ExtractError::CorruptArchive(e.to_string()))?;
        let name = entry.name().to_string();
        // Prevent path traversal
        if name.contains("..") || name.starts_with('/') || name.starts_with('\\') {
            return Err(ExtractError::UnsupportedFormat(format!(
                "Path traversal attempt detected: {}",
                name
            )));
        }
        if name.len() > limits.max_entry_name_length {
            return Err(ExtractError::UnsupportedFormat(
                "Entry name too long".to_string(),
            ));
        }
        if !name.to_ascii_lowercase().ends_with(".xml") {
            continue;
        }
        let compressed_size = entry.compressed_size();
        let uncompressed_size = entry.size();
        if compressed_size > 0 {
            let compression_ratio = uncompressed_size as f64 / compressed_size as f64;
            if compression_ratio > limits.max_compression_ratio {
                return Err(ExtractError::TooLarge(format!(
                    "Suspicious compression ratio: {:.2}",
                    compression_ratio
                )));
            }
        }
        if uncompressed_size > limits.max_decompressed_size as u64 {
            return Err(ExtractError::TooLarge(
                "Decompressed entry size too large".to_string(),
            ));
        }
        let mut contents = Vec::with_capacity(uncompressed_size as usize);
        entry.read_to_end(&mut contents)?;
        return Ok(contents);
    }
    Err(ExtractError::UnsupportedFormat(
        "No XML entry found in archive".to_string(),
    ))
}

fn extract_gzip(blob: &[u8], limits: &Limits) -> Result<Vec<u8>, ExtractError> {
    let decoder = GzDecoder::new(blob);
    let mut contents = Vec::new();
    decoder
        .take(limits.max_decompressed_size as u64 + 1)
        .read_to_end(&mut contents)
        .map_err(|e| ExtractError::CorruptArchive(e.to_string()))?;
    if contents.len() > limits.max_decompressed_size {
        return Err(ExtractError::TooLarge(
            "Decompressed size too large".to_string(),
        ));
    }
    Ok(contents)
}
