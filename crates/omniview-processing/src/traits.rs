//! Collaborator contracts used by the dispatcher.
//!
//! Each viewer delegates the actual parsing to one of these traits so that
//! converters can be swapped or mocked without touching dispatch logic.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use omniview_core::models::{ArchiveEntry, ResourceHandle};

/// Word-processor document converted to HTML. The HTML is untrusted until it
/// has passed through the sanitizer.
#[derive(Clone, Debug, Default)]
pub struct ConvertedDocument {
    pub html: String,
    pub warnings: Vec<String>,
    /// Visible text, used for word counts
    pub plain_text: String,
}

#[derive(Clone, Debug, Default)]
pub struct Workbook {
    pub sheet_names: Vec<String>,
    pub sheets: HashMap<String, Vec<Vec<String>>>,
}

/// Where the PDF bytes come from.
#[derive(Clone, Debug)]
pub enum PdfSource {
    Bytes(Bytes),
    Url(String),
}

#[derive(Clone, Debug)]
pub struct PdfView {
    /// Embeddable URL for the native viewer
    pub src: String,
    pub page_count: Option<u32>,
    /// Handle issued for local bytes, if any
    pub handle: Option<ResourceHandle>,
}

/// Result of a HEAD request.
#[derive(Clone, Debug, Default)]
pub struct ProbeResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

impl ProbeResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert_to_html(&self, name: &str, data: Bytes) -> anyhow::Result<ConvertedDocument>;
}

#[async_trait]
pub trait SpreadsheetParser: Send + Sync {
    async fn parse(&self, name: &str, data: Bytes) -> anyhow::Result<Workbook>;
}

/// Lists archive contents. Implementations must not extract entry data.
#[async_trait]
pub trait ArchiveReader: Send + Sync {
    async fn list_entries(&self, name: &str, data: Bytes) -> anyhow::Result<Vec<ArchiveEntry>>;
}

#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render_first_page(&self, source: PdfSource) -> anyhow::Result<PdfView>;
}

#[async_trait]
pub trait NetworkFetch: Send + Sync {
    async fn head(&self, url: &str) -> anyhow::Result<ProbeResponse>;

    /// Download a body, failing once it grows past `max_bytes`.
    async fn get(&self, url: &str, max_bytes: u64) -> anyhow::Result<Bytes>;
}

/// A handle that has been issued and not yet revoked.
#[derive(Clone, Debug)]
pub struct IssuedHandle {
    pub handle: ResourceHandle,
    pub size_bytes: u64,
    pub issued_at: Instant,
}

/// Issues and revokes object URLs for in-memory bytes.
pub trait HandleIssuer: Send + Sync {
    fn issue(&self, data: Bytes, mime_type: &str) -> ResourceHandle;

    /// Revoke a handle. Returns `false` if it was already revoked or unknown.
    fn revoke(&self, handle: &ResourceHandle) -> bool;

    fn is_live(&self, handle: &ResourceHandle) -> bool;

    /// Handles that have not been revoked yet.
    fn live_handles(&self) -> Vec<IssuedHandle>;

    /// Total bytes held by live handles.
    fn retained_bytes(&self) -> u64 {
        self.live_handles().iter().map(|h| h.size_bytes).sum()
    }
}
