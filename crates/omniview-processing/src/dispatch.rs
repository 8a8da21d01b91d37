//! Lazy, cached materialization of media records.
//!
//! The dispatcher picks a viewer from the record's render strategy, runs it at
//! most once per record id, and turns every failure into
//! [`RenderedContent::Error`]. Object URLs issued along the way are reported
//! back through [`Materialized::handle`] so the session can track and release
//! them.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use omniview_core::config::ViewerConfig;
use omniview_core::constants::{TEXT_ONLY_BANNER, UNSUPPORTED_BANNER};
use omniview_core::error::{ViewerError, ViewerResult};
use omniview_core::models::{
    Category, DocumentStats, MediaId, MediaRecord, Origin, RenderStrategy,
    RenderedContent, ResourceHandle, SheetPreview,
};
use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::classifier::{expected_content_type, language_for};
use crate::handles::ObjectUrlRegistry;
use crate::sanitize::HtmlSanitizer;
use crate::traits::{
    ArchiveReader, DocumentConverter, HandleIssuer, NetworkFetch, PdfRenderer, PdfSource,
    SpreadsheetParser,
};
use crate::viewers::{
    DefaultArchiveReader, DefaultSpreadsheetParser, DocxConverter, EmbedPdfRenderer,
    UnsupportedFormat,
};

/// Output of one materialization pass.
#[derive(Debug, Clone)]
pub struct Materialized {
    pub content: RenderedContent,
    /// Object URL created for this record, if any
    pub handle: Option<ResourceHandle>,
}

impl Materialized {
    fn ready(content: RenderedContent) -> Self {
        Self {
            content,
            handle: None,
        }
    }
}

/// External converters used by the dispatcher.
#[derive(Clone)]
pub struct Collaborators {
    pub documents: Arc<dyn DocumentConverter>,
    pub spreadsheets: Arc<dyn SpreadsheetParser>,
    pub archives: Arc<dyn ArchiveReader>,
    pub pdf: Arc<dyn PdfRenderer>,
    pub fetch: Arc<dyn NetworkFetch>,
    pub handles: Arc<dyn HandleIssuer>,
}

impl Collaborators {
    /// Default in-process viewers around the given network client and handle registry.
    pub fn with_defaults(
        fetch: Arc<dyn NetworkFetch>,
        handles: Arc<ObjectUrlRegistry>,
    ) -> anyhow::Result<Self> {
        Self::for_config(fetch, handles, &ViewerConfig::default())
    }

    /// Default viewers with decompression bounded by `config`.
    pub fn for_config(
        fetch: Arc<dyn NetworkFetch>,
        handles: Arc<ObjectUrlRegistry>,
        config: &ViewerConfig,
    ) -> anyhow::Result<Self> {
        let limit = config.max_decompressed_bytes;
        Ok(Self {
            documents: Arc::new(DocxConverter::new()?.with_part_limit(limit)),
            spreadsheets: Arc::new(DefaultSpreadsheetParser::new()?.with_part_limit(limit)),
            archives: Arc::new(DefaultArchiveReader::with_limit(limit)),
            pdf: Arc::new(EmbedPdfRenderer::new(handles.clone())),
            fetch,
            handles,
        })
    }
}

/// Size limits applied while materializing.
#[derive(Debug, Clone, Copy)]
pub struct DispatchLimits {
    pub max_text_preview_bytes: usize,
    pub max_preview_rows: usize,
    pub max_remote_fetch_bytes: u64,
}

impl From<&ViewerConfig> for DispatchLimits {
    fn from(config: &ViewerConfig) -> Self {
        Self {
            max_text_preview_bytes: config.max_text_preview_bytes,
            max_preview_rows: config.max_preview_rows,
            max_remote_fetch_bytes: config.max_remote_fetch_bytes,
        }
    }
}

type CacheSlot = Arc<OnceCell<Arc<Materialized>>>;

pub struct ViewerDispatcher {
    collaborators: Collaborators,
    sanitizer: HtmlSanitizer,
    limits: DispatchLimits,
    cache: Mutex<HashMap<MediaId, CacheSlot>>,
}

impl ViewerDispatcher {
    pub fn new(collaborators: Collaborators, limits: DispatchLimits) -> anyhow::Result<Self> {
        Ok(Self {
            collaborators,
            sanitizer: HtmlSanitizer::new()?,
            limits,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Materialize a record, running the viewer only on the first call.
    ///
    /// Concurrent callers for the same id wait on the same pass.
    #[tracing::instrument(skip(self, record), fields(media.id = %record.id, media.category = %record.category))]
    pub async fn materialize(&self, record: &MediaRecord) -> Arc<Materialized> {
        let slot = {
            let mut cache = self.cache.lock();
            cache
                .entry(record.id)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        slot.get_or_init(|| async {
            let materialized = match self.render(record).await {
                Ok(materialized) => materialized,
                Err(e) => {
                    tracing::warn!(error = %e, name = %record.name, "Materialization failed");
                    Materialized::ready(RenderedContent::from_error(&e))
                }
            };
            Arc::new(materialized)
        })
        .await
        .clone()
    }

    /// Cached result for a record, if materialization has completed.
    pub fn cached(&self, id: &MediaId) -> Option<Arc<Materialized>> {
        self.cache.lock().get(id).and_then(|slot| slot.get().cloned())
    }

    /// Drop the cache entry for a record and return what it held.
    pub fn forget(&self, id: &MediaId) -> Option<Arc<Materialized>> {
        self.cache
            .lock()
            .remove(id)
            .and_then(|slot| slot.get().cloned())
    }

    pub fn clear(&self) -> Vec<Arc<Materialized>> {
        self.cache
            .lock()
            .drain()
            .filter_map(|(_, slot)| slot.get().cloned())
            .collect()
    }

    async fn render(&self, record: &MediaRecord) -> ViewerResult<Materialized> {
        match record.render_strategy() {
            RenderStrategy::Image => self.render_image(record),
            RenderStrategy::Audio => self.render_playable(record, false),
            RenderStrategy::Video => self.render_playable(record, true),
            RenderStrategy::Pdf => self.render_pdf(record).await,
            RenderStrategy::Document => self.render_document(record).await,
            RenderStrategy::Spreadsheet => self.render_spreadsheet(record).await,
            RenderStrategy::Text => self.render_text(record).await,
            RenderStrategy::Archive => self.render_archive(record).await,
            RenderStrategy::TextOnly => self.render_text_only(record).await,
        }
    }

    fn render_image(&self, record: &MediaRecord) -> ViewerResult<Materialized> {
        let src = match &record.origin {
            Origin::Local(file) => format!(
                "data:{};base64,{}",
                content_type_for(record),
                STANDARD.encode(&file.bytes)
            ),
            Origin::Remote(remote) => remote.url.clone(),
        };
        Ok(Materialized::ready(RenderedContent::Image { src }))
    }

    fn render_playable(&self, record: &MediaRecord, video: bool) -> ViewerResult<Materialized> {
        let (src, handle, embedded) = match &record.origin {
            Origin::Local(file) => {
                let handle = self
                    .collaborators
                    .handles
                    .issue(file.bytes.clone(), &content_type_for(record));
                (handle.to_string(), Some(handle), false)
            }
            Origin::Remote(remote) => (remote.url.clone(), None, remote.embed.is_some()),
        };

        let content = if video {
            RenderedContent::Video { src, embedded }
        } else {
            RenderedContent::Audio { src }
        };

        Ok(Materialized { content, handle })
    }

    async fn render_pdf(&self, record: &MediaRecord) -> ViewerResult<Materialized> {
        let source = match &record.origin {
            Origin::Local(file) => PdfSource::Bytes(file.bytes.clone()),
            Origin::Remote(remote) => PdfSource::Url(remote.url.clone()),
        };

        let view = self
            .collaborators
            .pdf
            .render_first_page(source)
            .await
            .map_err(|e| collaborator_error(&e))?;

        Ok(Materialized {
            content: RenderedContent::Pdf {
                src: view.src,
                page_count: view.page_count,
            },
            handle: view.handle,
        })
    }

    async fn render_document(&self, record: &MediaRecord) -> ViewerResult<Materialized> {
        let data = self.load_bytes(record).await?;
        let converted = self
            .collaborators
            .documents
            .convert_to_html(&record.name, data)
            .await
            .map_err(|e| collaborator_error(&e))?;

        Ok(Materialized::ready(RenderedContent::Document {
            html: self.sanitizer.sanitize(&converted.html),
            warnings: converted.warnings,
            stats: DocumentStats::from_text(&converted.plain_text),
        }))
    }

    async fn render_spreadsheet(&self, record: &MediaRecord) -> ViewerResult<Materialized> {
        let data = self.load_bytes(record).await?;
        let mut workbook = self
            .collaborators
            .spreadsheets
            .parse(&record.name, data)
            .await
            .map_err(|e| collaborator_error(&e))?;

        let active_sheet = workbook
            .sheet_names
            .first()
            .cloned()
            .ok_or_else(|| ViewerError::Decode("Workbook contains no sheets".to_string()))?;
        let mut rows = workbook.sheets.remove(&active_sheet).unwrap_or_default();
        let truncated = rows.len() > self.limits.max_preview_rows;
        rows.truncate(self.limits.max_preview_rows);

        Ok(Materialized::ready(RenderedContent::Spreadsheet(
            SheetPreview {
                sheet_names: workbook.sheet_names,
                active_sheet,
                rows,
                truncated,
            },
        )))
    }

    async fn render_text(&self, record: &MediaRecord) -> ViewerResult<Materialized> {
        let data = self.load_bytes(record).await?;
        let (mut content, truncated) = decode_text(&data, self.limits.max_text_preview_bytes);

        let language = record
            .extension
            .as_deref()
            .and_then(language_for)
            .or_else(|| language_for_mime(&record.mime_type));

        if language == Some("json") && !truncated {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&content) {
                if let Ok(pretty) = serde_json::to_string_pretty(&value) {
                    content = pretty;
                }
            }
        }

        Ok(Materialized::ready(RenderedContent::Text {
            line_count: content.lines().count(),
            content,
            language: language.map(str::to_string),
            truncated,
        }))
    }

    async fn render_archive(&self, record: &MediaRecord) -> ViewerResult<Materialized> {
        let data = self.load_bytes(record).await?;
        let archive_len = data.len() as u64;
        let entries = self
            .collaborators
            .archives
            .list_entries(&record.name, data)
            .await
            .map_err(|e| collaborator_error(&e))?;

        let files = entries.iter().filter(|e| !e.is_directory);
        let file_count = files.clone().count();
        let total_size: u64 = files.clone().map(|e| e.uncompressed_size).sum();
        let compressed_size: u64 = if entries.iter().any(|e| e.compressed_size.is_some()) {
            files.filter_map(|e| e.compressed_size).sum()
        } else {
            archive_len
        };

        Ok(Materialized::ready(RenderedContent::Archive {
            entries,
            file_count,
            total_size,
            compressed_size,
        }))
    }

    async fn render_text_only(&self, record: &MediaRecord) -> ViewerResult<Materialized> {
        let data = self.load_bytes(record).await?;
        let (content, truncated) = decode_text(&data, self.limits.max_text_preview_bytes);
        let banner = if record.danger_flag {
            TEXT_ONLY_BANNER
        } else {
            UNSUPPORTED_BANNER
        };

        Ok(Materialized::ready(RenderedContent::TextOnly {
            banner: banner.to_string(),
            content,
            truncated,
        }))
    }

    async fn load_bytes(&self, record: &MediaRecord) -> ViewerResult<Bytes> {
        match &record.origin {
            Origin::Local(file) => Ok(file.bytes.clone()),
            Origin::Remote(remote) => {
                if remote.embed.is_some() {
                    return Err(ViewerError::UnsupportedType(format!(
                        "{} embed as {}",
                        record.name, record.category
                    )));
                }
                self.collaborators
                    .fetch
                    .get(&remote.url, self.limits.max_remote_fetch_bytes)
                    .await
                    .map_err(|e| ViewerError::Network(format!("{:#}", e)))
            }
        }
    }
}

fn collaborator_error(err: &anyhow::Error) -> ViewerError {
    match err.downcast_ref::<UnsupportedFormat>() {
        Some(unsupported) => ViewerError::UnsupportedType(unsupported.0.clone()),
        None => ViewerError::decode(err),
    }
}

fn content_type_for(record: &MediaRecord) -> String {
    if !record.mime_type.is_empty() {
        return record.mime_type.clone();
    }
    record
        .extension
        .as_deref()
        .and_then(expected_content_type)
        .unwrap_or(match record.category {
            Category::Image => "image/*",
            Category::Audio => "audio/*",
            Category::Video => "video/*",
            _ => "application/octet-stream",
        })
        .to_string()
}

fn language_for_mime(mime_type: &str) -> Option<&'static str> {
    let mime = mime_type.split(';').next().unwrap_or("").trim();
    match mime {
        "application/json" => Some("json"),
        "application/xml" | "text/xml" => Some("xml"),
        "text/html" => Some("html"),
        "text/css" => Some("css"),
        "text/markdown" => Some("markdown"),
        _ => None,
    }
}

/// Lossy UTF-8 decode, cut at `max_bytes` on a character boundary.
fn decode_text(data: &[u8], max_bytes: usize) -> (String, bool) {
    if data.len() <= max_bytes {
        return (String::from_utf8_lossy(data).into_owned(), false);
    }

    let mut end = max_bytes;
    // Step back over UTF-8 continuation bytes.
    while end > 0 && (data[end] & 0b1100_0000) == 0b1000_0000 {
        end -= 1;
    }
    (String::from_utf8_lossy(&data[..end]).into_owned(), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use omniview_core::models::{Classification, LocalFile, RemoteResource};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::classifier::classify;
    use crate::traits::{ConvertedDocument, ProbeResponse};

    struct MockFetch {
        body: &'static [u8],
        gets: AtomicUsize,
    }

    #[async_trait]
    impl NetworkFetch for MockFetch {
        async fn head(&self, _url: &str) -> anyhow::Result<ProbeResponse> {
            Ok(ProbeResponse::default())
        }

        async fn get(&self, _url: &str, _max_bytes: u64) -> anyhow::Result<Bytes> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from_static(self.body))
        }
    }

    struct FailingConverter;

    #[async_trait]
    impl DocumentConverter for FailingConverter {
        async fn convert_to_html(&self, _name: &str, _data: Bytes) -> anyhow::Result<ConvertedDocument> {
            Err(anyhow::anyhow!("corrupt document"))
        }
    }

    struct ScriptedConverter;

    #[async_trait]
    impl DocumentConverter for ScriptedConverter {
        async fn convert_to_html(&self, _name: &str, _data: Bytes) -> anyhow::Result<ConvertedDocument> {
            Ok(ConvertedDocument {
                html: "<p onclick=\"x()\">Hello</p><script>alert(1)</script>".to_string(),
                warnings: vec!["styles ignored".to_string()],
                plain_text: "Hello".to_string(),
            })
        }
    }

    fn setup(body: &'static [u8]) -> (ViewerDispatcher, Arc<ObjectUrlRegistry>, Arc<MockFetch>) {
        let registry = Arc::new(ObjectUrlRegistry::new());
        let fetch = Arc::new(MockFetch {
            body,
            gets: AtomicUsize::new(0),
        });
        let collaborators = Collaborators::with_defaults(fetch.clone(), registry.clone()).unwrap();
        let dispatcher =
            ViewerDispatcher::new(collaborators, DispatchLimits::from(&ViewerConfig::default()))
                .unwrap();
        (dispatcher, registry, fetch)
    }

    fn local(name: &str, mime: &str, bytes: &'static [u8]) -> MediaRecord {
        let classification = classify(name, mime);
        MediaRecord::from_local(
            LocalFile::new(name, mime, Bytes::from_static(bytes)),
            classification,
        )
    }

    fn remote(name: &str, url: &str, classification: Classification) -> MediaRecord {
        MediaRecord::from_remote(
            name.to_string(),
            0,
            String::new(),
            classification,
            RemoteResource {
                url: url.to_string(),
                embed: None,
                probed: false,
            },
        )
    }

    #[tokio::test]
    async fn test_local_image_becomes_data_url() {
        let (dispatcher, registry, _) = setup(b"");
        let record = local("dot.png", "image/png", b"\x89PNG");
        let result = dispatcher.materialize(&record).await;

        match &result.content {
            RenderedContent::Image { src } => assert_eq!(src, "data:image/png;base64,iVBORw=="),
            other => panic!("unexpected {:?}", other),
        }
        assert!(result.handle.is_none());
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn test_materialize_is_idempotent() {
        let (dispatcher, registry, _) = setup(b"");
        let record = local("song.mp3", "audio/mpeg", b"ID3");

        let first = dispatcher.materialize(&record).await;
        let second = dispatcher.materialize(&record).await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.live_count(), 1);
        assert!(matches!(first.content, RenderedContent::Audio { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_materialize_single_pass() {
        let (dispatcher, registry, _) = setup(b"");
        let record = local("clip.mp4", "video/mp4", b"\0\0\0\x18ftyp");

        let (a, b) = tokio::join!(dispatcher.materialize(&record), dispatcher.materialize(&record));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.live_count(), 1);
    }

    #[tokio::test]
    async fn test_dangerous_pdf_renders_text_only() {
        let (dispatcher, registry, _) = setup(b"");
        let record = local("invoice.pdf.exe", "application/pdf", b"%PDF-1.4 MZ payload");
        assert!(record.danger_flag);

        let result = dispatcher.materialize(&record).await;
        match &result.content {
            RenderedContent::TextOnly { banner, content, .. } => {
                assert_eq!(banner, TEXT_ONLY_BANNER);
                assert!(content.contains("payload"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_gets_its_own_banner() {
        let (dispatcher, _, _) = setup(b"");
        let record = local("data.qqq", "", b"raw");
        let result = dispatcher.materialize(&record).await;
        match &result.content {
            RenderedContent::TextOnly { banner, .. } => assert_eq!(banner, UNSUPPORTED_BANNER),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_decode_failure_is_tagged() {
        let (dispatcher, _, _) = setup(b"");
        let record = local("broken.zip", "application/zip", b"PK\x03\x04junk");
        let result = dispatcher.materialize(&record).await;
        match &result.content {
            RenderedContent::Error { code, .. } => assert_eq!(code, "DECODE_ERROR"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_legacy_format_is_unsupported_type() {
        let (dispatcher, _, _) = setup(b"");
        let record = local("old.xls", "", &[0xD0, 0xCF, 0x11, 0xE0]);
        let result = dispatcher.materialize(&record).await;
        match &result.content {
            RenderedContent::Error { code, .. } => assert_eq!(code, "UNSUPPORTED_TYPE"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_document_html_is_sanitized() {
        let (dispatcher, registry, fetch) = setup(b"");
        let mut collaborators =
            Collaborators::with_defaults(fetch, registry).unwrap();
        collaborators.documents = Arc::new(ScriptedConverter);
        let dispatcher_with_script = ViewerDispatcher::new(collaborators, dispatcher.limits).unwrap();

        let record = local("letter.docx", "", b"PK");
        let result = dispatcher_with_script.materialize(&record).await;
        match &result.content {
            RenderedContent::Document { html, warnings, stats } => {
                assert_eq!(html, "<p>Hello</p>");
                assert_eq!(warnings.len(), 1);
                assert_eq!(stats.words, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_converter_error_does_not_escape() {
        let (dispatcher, registry, fetch) = setup(b"");
        let mut collaborators = Collaborators::with_defaults(fetch, registry).unwrap();
        collaborators.documents = Arc::new(FailingConverter);
        let dispatcher = ViewerDispatcher::new(collaborators, dispatcher.limits).unwrap();

        let result = dispatcher.materialize(&local("bad.docx", "", b"PK")).await;
        assert!(result.content.is_error());
    }

    #[tokio::test]
    async fn test_json_is_pretty_printed() {
        let (dispatcher, _, _) = setup(b"");
        let record = local("data.json", "application/json", br#"{"a":[1,2]}"#);
        let result = dispatcher.materialize(&record).await;
        match &result.content {
            RenderedContent::Text {
                content,
                language,
                line_count,
                ..
            } => {
                assert_eq!(language.as_deref(), Some("json"));
                assert!(content.contains("\n"));
                assert!(*line_count > 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remote_text_is_fetched_once() {
        let (dispatcher, _, fetch) = setup(b"line one\nline two\n");
        let record = remote(
            "notes.txt",
            "https://example.com/notes.txt",
            classify("notes.txt", ""),
        );

        dispatcher.materialize(&record).await;
        let result = dispatcher.materialize(&record).await;

        assert_eq!(fetch.gets.load(Ordering::SeqCst), 1);
        match &result.content {
            RenderedContent::Text { line_count, .. } => assert_eq!(*line_count, 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_remote_video_is_direct_url() {
        let (dispatcher, registry, _) = setup(b"");
        let record = remote(
            "clip.mp4",
            "https://cdn.example.com/clip.mp4",
            classify("clip.mp4", ""),
        );
        let result = dispatcher.materialize(&record).await;
        assert_eq!(
            result.content,
            RenderedContent::Video {
                src: "https://cdn.example.com/clip.mp4".to_string(),
                embedded: false
            }
        );
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn test_spreadsheet_rows_truncated() {
        let (dispatcher, registry, fetch) = setup(b"");
        let limits = DispatchLimits {
            max_preview_rows: 2,
            ..dispatcher.limits
        };
        let dispatcher =
            ViewerDispatcher::new(Collaborators::with_defaults(fetch, registry).unwrap(), limits)
                .unwrap();

        let record = local("t.csv", "text/csv", b"h1,h2\n1,2\n3,4\n");
        let result = dispatcher.materialize(&record).await;
        match &result.content {
            RenderedContent::Spreadsheet(preview) => {
                assert_eq!(preview.rows.len(), 2);
                assert!(preview.truncated);
                assert_eq!(preview.active_sheet, "t");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_forget_returns_cached_handle() {
        let (dispatcher, _, _) = setup(b"");
        let record = local("song.ogg", "audio/ogg", b"OggS");
        let first = dispatcher.materialize(&record).await;

        let forgotten = dispatcher.forget(&record.id).unwrap();
        assert_eq!(forgotten.handle, first.handle);
        assert!(dispatcher.cached(&record.id).is_none());
    }

    #[test]
    fn test_decode_text_respects_char_boundary() {
        let data = "héllo".as_bytes();
        let (text, truncated) = decode_text(data, 2);
        assert_eq!(text, "h");
        assert!(truncated);
    }
}
