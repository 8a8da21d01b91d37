//! Shared defaults for the viewer session.

/// Maximum number of records held in the live set.
pub const DEFAULT_MAX_RECORDS: usize = 50;

/// Interval between lifetime sweeps.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10;

pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_REMOTE_FETCH_MB: u64 = 50;
pub const DEFAULT_MAX_TEXT_PREVIEW_KB: usize = 512;
pub const DEFAULT_MAX_PREVIEW_ROWS: usize = 1000;
pub const DEFAULT_RESOLVE_CONCURRENCY: usize = 8;

/// Largest local file accepted into the live set.
pub const DEFAULT_MAX_FILE_MB: u64 = 100;

/// Cap on bytes inflated from any single archive or package member.
pub const DEFAULT_MAX_DECOMPRESSED_MB: u64 = 64;

/// Bytes held by live object URLs before the sweep falls back to pruning.
pub const DEFAULT_RETAINED_BUDGET_MB: u64 = 512;

/// Number of records kept by `prune_to_recent` when invoked without an explicit count.
pub const DEFAULT_PRUNE_KEEP: usize = 5;

/// Display name used when a URL has no usable path segment.
pub const FALLBACK_REMOTE_NAME: &str = "media-file";

/// Prefix of every object URL issued by the handle registry.
pub const OBJECT_URL_PREFIX: &str = "blob:omniview/";

pub const TEXT_ONLY_BANNER: &str =
    "Potentially unsafe file. Showing raw text only; nothing in this file was executed or rendered.";

pub const UNSUPPORTED_BANNER: &str =
    "No viewer is available for this file type. Showing raw text only.";

pub const DEFAULT_REDIRECTOR_HOSTS: &[&str] = &[
    "google.com",
    "www.google.com",
    "l.facebook.com",
    "lm.facebook.com",
    "l.instagram.com",
    "out.reddit.com",
    "href.li",
];
