//! Configuration module
//!
//! Session settings are read from `OMNIVIEW_*` environment variables (a `.env`
//! file is honoured). Every value has a default matching the reference viewer.

use std::env;
use std::time::Duration;

use crate::constants::*;

/// Viewer session configuration
#[derive(Clone, Debug)]
pub struct ViewerConfig {
    /// Upper bound on the live record set
    pub max_records: usize,
    pub sweep_interval: Duration,
    /// Issue a HEAD request for pasted URLs
    pub probe_remote: bool,
    pub probe_timeout: Duration,
    pub fetch_timeout: Duration,
    pub max_remote_fetch_bytes: u64,
    /// Local files larger than this are rejected at ingest
    pub max_file_bytes: u64,
    /// Upper bound on inflated archive member size
    pub max_decompressed_bytes: u64,
    /// Object URL memory allowed before the sweep prunes old records
    pub retained_budget_bytes: u64,
    pub max_text_preview_bytes: usize,
    pub max_preview_rows: usize,
    pub resolve_concurrency: usize,
    /// Tear the session down when the view is hidden
    pub purge_on_hide: bool,
    /// Block persistent storage writes for the session lifetime
    pub lock_storage: bool,
    pub redirector_hosts: Vec<String>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            max_records: DEFAULT_MAX_RECORDS,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            probe_remote: true,
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            max_remote_fetch_bytes: megabytes(DEFAULT_MAX_REMOTE_FETCH_MB),
            max_file_bytes: megabytes(DEFAULT_MAX_FILE_MB),
            max_decompressed_bytes: megabytes(DEFAULT_MAX_DECOMPRESSED_MB),
            retained_budget_bytes: megabytes(DEFAULT_RETAINED_BUDGET_MB),
            max_text_preview_bytes: DEFAULT_MAX_TEXT_PREVIEW_KB.saturating_mul(1024),
            max_preview_rows: DEFAULT_MAX_PREVIEW_ROWS,
            resolve_concurrency: DEFAULT_RESOLVE_CONCURRENCY,
            purge_on_hide: true,
            lock_storage: true,
            redirector_hosts: DEFAULT_REDIRECTOR_HOSTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ViewerConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let max_records = env::var("OMNIVIEW_MAX_RECORDS")
            .unwrap_or_else(|_| DEFAULT_MAX_RECORDS.to_string())
            .parse()
            .unwrap_or(DEFAULT_MAX_RECORDS);

        let sweep_interval_secs = env::var("OMNIVIEW_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| DEFAULT_SWEEP_INTERVAL_SECS.to_string())
            .parse()
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);

        let probe_remote = parse_bool("OMNIVIEW_PROBE_REMOTE", true);

        let probe_timeout_secs = env::var("OMNIVIEW_PROBE_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_PROBE_TIMEOUT_SECS.to_string())
            .parse()
            .unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS);

        let fetch_timeout_secs = env::var("OMNIVIEW_FETCH_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_FETCH_TIMEOUT_SECS.to_string())
            .parse()
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);

        let max_remote_fetch_mb: u64 = env::var("OMNIVIEW_MAX_REMOTE_FETCH_MB")
            .unwrap_or_else(|_| DEFAULT_MAX_REMOTE_FETCH_MB.to_string())
            .parse()
            .unwrap_or(DEFAULT_MAX_REMOTE_FETCH_MB);

        let max_file_mb: u64 = env::var("OMNIVIEW_MAX_FILE_MB")
            .unwrap_or_else(|_| DEFAULT_MAX_FILE_MB.to_string())
            .parse()
            .unwrap_or(DEFAULT_MAX_FILE_MB);

        let max_decompressed_mb: u64 = env::var("OMNIVIEW_MAX_DECOMPRESSED_MB")
            .unwrap_or_else(|_| DEFAULT_MAX_DECOMPRESSED_MB.to_string())
            .parse()
            .unwrap_or(DEFAULT_MAX_DECOMPRESSED_MB);

        let retained_budget_mb: u64 = env::var("OMNIVIEW_RETAINED_BUDGET_MB")
            .unwrap_or_else(|_| DEFAULT_RETAINED_BUDGET_MB.to_string())
            .parse()
            .unwrap_or(DEFAULT_RETAINED_BUDGET_MB);

        let max_text_preview_kb: usize = env::var("OMNIVIEW_MAX_TEXT_PREVIEW_KB")
            .unwrap_or_else(|_| DEFAULT_MAX_TEXT_PREVIEW_KB.to_string())
            .parse()
            .unwrap_or(DEFAULT_MAX_TEXT_PREVIEW_KB);

        let max_preview_rows = env::var("OMNIVIEW_MAX_PREVIEW_ROWS")
            .unwrap_or_else(|_| DEFAULT_MAX_PREVIEW_ROWS.to_string())
            .parse()
            .unwrap_or(DEFAULT_MAX_PREVIEW_ROWS);

        let resolve_concurrency = env::var("OMNIVIEW_RESOLVE_CONCURRENCY")
            .unwrap_or_else(|_| DEFAULT_RESOLVE_CONCURRENCY.to_string())
            .parse()
            .unwrap_or(DEFAULT_RESOLVE_CONCURRENCY);

        let redirector_hosts = match env::var("OMNIVIEW_REDIRECTOR_HOSTS") {
            Ok(hosts) => hosts
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => DEFAULT_REDIRECTOR_HOSTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };

        let config = Self {
            max_records,
            sweep_interval: Duration::from_secs(sweep_interval_secs),
            probe_remote,
            probe_timeout: Duration::from_secs(probe_timeout_secs),
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            max_remote_fetch_bytes: megabytes(max_remote_fetch_mb),
            max_file_bytes: megabytes(max_file_mb),
            max_decompressed_bytes: megabytes(max_decompressed_mb),
            retained_budget_bytes: megabytes(retained_budget_mb),
            max_text_preview_bytes: max_text_preview_kb.saturating_mul(1024),
            max_preview_rows,
            resolve_concurrency,
            purge_on_hide: parse_bool("OMNIVIEW_PURGE_ON_HIDE", true),
            lock_storage: parse_bool("OMNIVIEW_LOCK_STORAGE", true),
            redirector_hosts,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.max_records == 0 {
            return Err(anyhow::anyhow!("OMNIVIEW_MAX_RECORDS must be at least 1"));
        }

        if self.sweep_interval.is_zero() {
            return Err(anyhow::anyhow!(
                "OMNIVIEW_SWEEP_INTERVAL_SECS must be greater than 0"
            ));
        }

        if self.resolve_concurrency == 0 {
            return Err(anyhow::anyhow!(
                "OMNIVIEW_RESOLVE_CONCURRENCY must be at least 1"
            ));
        }

        if self.max_text_preview_bytes == 0 {
            return Err(anyhow::anyhow!(
                "OMNIVIEW_MAX_TEXT_PREVIEW_KB must be greater than 0"
            ));
        }

        if self.max_file_bytes == 0 {
            return Err(anyhow::anyhow!("OMNIVIEW_MAX_FILE_MB must be greater than 0"));
        }

        if self.max_decompressed_bytes == 0 {
            return Err(anyhow::anyhow!(
                "OMNIVIEW_MAX_DECOMPRESSED_MB must be greater than 0"
            ));
        }

        Ok(())
    }
}

fn megabytes(mb: u64) -> u64 {
    mb.saturating_mul(1024 * 1024)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
        .unwrap_or(default)
}
