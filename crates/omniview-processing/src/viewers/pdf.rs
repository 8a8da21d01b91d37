//! PDF viewer that embeds the document natively.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::traits::{HandleIssuer, PdfRenderer, PdfSource, PdfView};

/// The header may be preceded by junk, but only within the first KiB.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Issues an object URL for local bytes and embeds remote URLs as-is.
pub struct EmbedPdfRenderer {
    handles: Arc<dyn HandleIssuer>,
}

impl EmbedPdfRenderer {
    pub fn new(handles: Arc<dyn HandleIssuer>) -> Self {
        Self { handles }
    }
}

pub fn has_pdf_header(data: &[u8]) -> bool {
    let window = &data[..data.len().min(HEADER_SEARCH_WINDOW)];
    window.windows(5).any(|w| w == b"%PDF-")
}

/// Best-effort page count from the largest `/Count` entry in the page tree.
pub fn page_count(data: &[u8]) -> Option<u32> {
    let text = String::from_utf8_lossy(data);
    text.split("/Count")
        .skip(1)
        .filter_map(|s| {
            let digits: String = s
                .chars()
                .skip_while(|c| c.is_whitespace())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse::<u32>().ok()
        })
        .max()
}

#[async_trait]
impl PdfRenderer for EmbedPdfRenderer {
    async fn render_first_page(&self, source: PdfSource) -> Result<PdfView> {
        match source {
            PdfSource::Url(url) => Ok(PdfView {
                src: url,
                page_count: None,
                handle: None,
            }),
            PdfSource::Bytes(data) => {
                if data.is_empty() {
                    return Err(anyhow!("PDF data is empty"));
                }
                if !has_pdf_header(&data) {
                    return Err(anyhow!("Missing %PDF header"));
                }

                let pages = page_count(&data);
                let handle = self.handles.issue(data, "application/pdf");
                Ok(PdfView {
                    src: format!("{}#page=1", handle),
                    page_count: pages,
                    handle: Some(handle),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handles::ObjectUrlRegistry;
    use bytes::Bytes;

    const SAMPLE: &[u8] =
        b"%PDF-1.4\n1 0 obj << /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>\n2 0 obj << /Count 1 >>\n%%EOF";

    #[test]
    fn test_page_count_takes_largest() {
        assert_eq!(page_count(SAMPLE), Some(2));
        assert_eq!(page_count(b"%PDF-1.4\n"), None);
    }

    #[test]
    fn test_header_detection() {
        assert!(has_pdf_header(SAMPLE));
        assert!(has_pdf_header(b"\r\n%PDF-1.7"));
        assert!(!has_pdf_header(b"MZ\x90\x00"));
    }

    #[tokio::test]
    async fn test_local_pdf_issues_handle() {
        let registry = Arc::new(ObjectUrlRegistry::new());
        let renderer = EmbedPdfRenderer::new(registry.clone());

        let view = renderer
            .render_first_page(PdfSource::Bytes(Bytes::from_static(SAMPLE)))
            .await
            .unwrap();

        let handle = view.handle.unwrap();
        assert!(registry.is_live(&handle));
        assert!(view.src.ends_with("#page=1"));
        assert_eq!(view.page_count, Some(2));
    }

    #[tokio::test]
    async fn test_non_pdf_is_rejected_without_handle() {
        let registry = Arc::new(ObjectUrlRegistry::new());
        let renderer = EmbedPdfRenderer::new(registry.clone());

        let result = renderer
            .render_first_page(PdfSource::Bytes(Bytes::from_static(b"MZ\x90\x00")))
            .await;
        assert!(result.is_err());
        assert_eq!(registry.live_count(), 0);
    }
}
