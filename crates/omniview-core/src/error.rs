//! Error types module
//!
//! All user-facing failures of the viewer are unified under [`ViewerError`].
//! Some variants are notices rather than failures: they are reported next to a
//! successful result and never abort a batch (see [`ErrorMetadata::is_notice`]).

use crate::models::MediaId;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like malformed user input
    Debug,
    /// Warning level - for degraded but recoverable situations
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata describing how an error should be presented to the user.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "INVALID_URL")
    fn error_code(&self) -> &'static str;

    /// Whether this error is a non-blocking notice rather than a failure
    fn is_notice(&self) -> bool;

    /// Suggested action for the user
    fn suggested_action(&self) -> Option<&'static str>;

    /// Message shown inline in the affected tile
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewerError {
    #[error("Invalid URL '{input}': {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Metadata probe failed for {url}: {reason}")]
    Probe { url: String, reason: String },

    #[error("{name} is {size} bytes, over the {limit} byte limit")]
    FileTooLarge { name: String, size: u64, limit: u64 },

    #[error("Live set is full ({limit} records): {dropped} input(s) dropped")]
    CapacityExceeded { limit: usize, dropped: usize },

    #[error("Write to {backend} storage blocked (key: {key})")]
    StorageWriteBlocked { backend: String, key: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Record not found: {0}")]
    RecordNotFound(MediaId),

    #[error("Invalid reorder from {from} to {to} (live set has {len} records)")]
    InvalidReorder { from: usize, to: usize, len: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type ViewerResult<T> = Result<T, ViewerError>;

impl ViewerError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        ViewerError::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Collapse a plumbing error chain into a decode failure.
    pub fn decode(err: &anyhow::Error) -> Self {
        ViewerError::Decode(format!("{:#}", err))
    }
}

impl From<serde_json::Error> for ViewerError {
    fn from(err: serde_json::Error) -> Self {
        ViewerError::Decode(format!("JSON parsing error: {}", err))
    }
}

/// Static metadata for each variant: (error_code, notice, suggested_action, log_level).
fn viewer_error_static_metadata(
    err: &ViewerError,
) -> (&'static str, bool, Option<&'static str>, LogLevel) {
    match err {
        ViewerError::InvalidUrl { .. } => (
            "INVALID_URL",
            false,
            Some("Check the link and paste a full http(s) address"),
            LogLevel::Debug,
        ),
        ViewerError::UnsupportedType(_) => (
            "UNSUPPORTED_TYPE",
            false,
            Some("Open the file with a dedicated application"),
            LogLevel::Debug,
        ),
        ViewerError::Decode(_) => (
            "DECODE_ERROR",
            false,
            Some("The file may be corrupt or mislabelled"),
            LogLevel::Warn,
        ),
        ViewerError::Probe { .. } => ("PROBE_FAILED", true, None, LogLevel::Debug),
        ViewerError::FileTooLarge { .. } => (
            "FILE_TOO_LARGE",
            false,
            Some("Open large files with a dedicated application"),
            LogLevel::Debug,
        ),
        ViewerError::CapacityExceeded { .. } => (
            "CAPACITY_EXCEEDED",
            true,
            Some("Remove some files before adding more"),
            LogLevel::Warn,
        ),
        ViewerError::StorageWriteBlocked { .. } => (
            "STORAGE_WRITE_BLOCKED",
            false,
            None,
            LogLevel::Warn,
        ),
        ViewerError::Network(_) => (
            "NETWORK_ERROR",
            false,
            Some("Check the connection and try again"),
            LogLevel::Warn,
        ),
        ViewerError::RecordNotFound(_) => ("RECORD_NOT_FOUND", false, None, LogLevel::Debug),
        ViewerError::InvalidReorder { .. } => ("INVALID_REORDER", false, None, LogLevel::Debug),
        ViewerError::Config(_) => (
            "CONFIG_ERROR",
            false,
            Some("Check OMNIVIEW_* environment variables"),
            LogLevel::Error,
        ),
    }
}

impl ErrorMetadata for ViewerError {
    fn error_code(&self) -> &'static str {
        viewer_error_static_metadata(self).0
    }

    fn is_notice(&self) -> bool {
        viewer_error_static_metadata(self).1
    }

    fn suggested_action(&self) -> Option<&'static str> {
        viewer_error_static_metadata(self).2
    }

    fn client_message(&self) -> String {
        match self {
            ViewerError::InvalidUrl { reason, .. } => format!("This link can't be opened: {}", reason),
            ViewerError::UnsupportedType(what) => format!("No preview available for {}", what),
            ViewerError::Decode(msg) => format!("Could not read this file: {}", msg),
            ViewerError::Probe { .. } => "File size unknown".to_string(),
            ViewerError::FileTooLarge { name, limit, .. } => format!(
                "{} is too large to preview (limit {} MB)",
                name,
                limit / (1024 * 1024)
            ),
            ViewerError::CapacityExceeded { limit, dropped } => format!(
                "Only {} files can be open at once; {} were not added",
                limit, dropped
            ),
            ViewerError::StorageWriteBlocked { .. } => {
                "Saving data is disabled while the viewer is open".to_string()
            }
            ViewerError::Network(msg) => format!("Could not download this file: {}", msg),
            ViewerError::RecordNotFound(_) => "This file is no longer open".to_string(),
            ViewerError::InvalidReorder { .. } => "That move is not possible".to_string(),
            ViewerError::Config(msg) => format!("Invalid configuration: {}", msg),
        }
    }

    fn log_level(&self) -> LogLevel {
        viewer_error_static_metadata(self).3
    }
}
