//! Configuration Module
//!
//! Reads the TOML configuration file selected on the command line, fills in
//! defaults, and validates key parameters such as the IMAP credentials and
//! the extraction size limits.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub email: EmailConfig,
    #[serde(default)]
    pub prometheus: PrometheusConfig,
    #[serde(default)]
    pub limits: Limits,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub imap_server: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default = "default_folder")]
    pub folder: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

/// Decompression hardening knobs for the archive extractor.
#[derive(Debug, Clone, Deserialize)]
pub struct Limits {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
    #[serde(default = "default_max_decompressed_size")]
    pub max_decompressed_size: usize,
    #[serde(default = "default_max_entries_in_zip")]
    pub max_entries_in_zip: usize,
    #[serde(default = "default_max_compression_ratio")]
    pub max_compression_ratio: f64,
    #[serde(default = "default_max_entry_name_length")]
    pub max_entry_name_length: usize,
}

const MIN_INTERVAL_SECS: u64 = 30;

fn default_imap_port() -> u16 {
    993
}
fn default_folder() -> String {
    "INBOX".to_string()
}
fn default_metrics_port() -> u16 {
    8000
}
fn default_interval() -> u64 {
    60
}
fn default_max_file_size() -> usize {
    10 * 1024 * 1024
}
fn default_max_decompressed_size() -> usize {
    100 * 1024 * 1024
}
fn default_max_entries_in_zip() -> usize {
    1000
}
fn default_max_compression_ratio() -> f64 {
    1000.0
}
fn default_max_entry_name_length() -> usize {
    256
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        PrometheusConfig {
            port: default_metrics_port(),
            interval_secs: default_interval(),
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_file_size: default_max_file_size(),
            max_decompressed_size: default_max_decompressed_size(),
            max_entries_in_zip: default_max_entries_in_zip(),
            max_compression_ratio: default_max_compression_ratio(),
            max_entry_name_length: default_max_entry_name_length(),
        }
    }
}

impl Config {
    /// Loads and validates the configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;
        let mut config: Config =
            toml::from_str(&raw).context("Failed to parse configuration file")?;

        if config.email.imap_server.trim().is_empty()
            || config.email.username.trim().is_empty()
            || config.email.password.trim().is_empty()
        {
            anyhow::bail!("Invalid config file: imap_server, username and password are required");
        }

        if config.limits.max_file_size > 500_000_000 {
            anyhow::bail!("Max file size too large (500MB limit)");
        }

        if config.prometheus.interval_secs < MIN_INTERVAL_SECS {
            log::warn!(
                "Configured interval {}s too low; using minimum {}s",
                config.prometheus.interval_secs,
                MIN_INTERVAL_SECS
            );
            config.prometheus.interval_secs = MIN_INTERVAL_SECS;
        }

        Ok(config)
    }
}
