use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque record identifier, unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(Uuid);

impl MediaId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MediaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Semantic kind of a record, derived from its name and MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Image,
    Audio,
    Video,
    Pdf,
    Document,
    Spreadsheet,
    Text,
    Code,
    Archive,
    Unsupported,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Image => "image",
            Category::Audio => "audio",
            Category::Video => "video",
            Category::Pdf => "pdf",
            Category::Document => "document",
            Category::Spreadsheet => "spreadsheet",
            Category::Text => "text",
            Category::Code => "code",
            Category::Archive => "archive",
            Category::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying a name/MIME pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Descriptive category. For dangerous files this is for display only.
    pub category: Category,
    pub danger_flag: bool,
    /// Lower-cased final extension, if the name has one
    pub extension: Option<String>,
}

/// Viewer actually used for a record once the danger flag has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStrategy {
    Image,
    Audio,
    Video,
    Pdf,
    Document,
    Spreadsheet,
    Text,
    Archive,
    TextOnly,
}

impl RenderStrategy {
    pub fn select(category: Category, danger_flag: bool) -> Self {
        if danger_flag {
            return RenderStrategy::TextOnly;
        }
        match category {
            Category::Image => RenderStrategy::Image,
            Category::Audio => RenderStrategy::Audio,
            Category::Video => RenderStrategy::Video,
            Category::Pdf => RenderStrategy::Pdf,
            Category::Document => RenderStrategy::Document,
            Category::Spreadsheet => RenderStrategy::Spreadsheet,
            Category::Text | Category::Code => RenderStrategy::Text,
            Category::Archive => RenderStrategy::Archive,
            Category::Unsupported => RenderStrategy::TextOnly,
        }
    }
}

/// In-memory file handed over by the drop target or file picker.
#[derive(Debug, Clone, Serialize)]
pub struct LocalFile {
    pub name: String,
    pub mime_type: String,
    #[serde(skip)]
    pub bytes: Bytes,
    pub last_modified: Option<DateTime<Utc>>,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
            last_modified: None,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Platform whose player is embedded instead of fetching the media directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum EmbedProvider {
    YouTube { video_id: String },
    Instagram { kind: String, code: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteResource {
    /// Final playable or embeddable URL
    pub url: String,
    pub embed: Option<EmbedProvider>,
    /// Whether a metadata probe succeeded
    pub probed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "origin", rename_all = "lowercase")]
pub enum Origin {
    Local(LocalFile),
    Remote(RemoteResource),
}

/// Revocable reference to in-memory bytes (an object URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceHandle(String);

impl ResourceHandle {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One ingested file or resolved remote resource.
#[derive(Debug, Clone, Serialize)]
pub struct MediaRecord {
    pub id: MediaId,
    pub name: String,
    /// Declared size; 0 when unknown
    pub size_bytes: u64,
    pub mime_type: String,
    pub category: Category,
    pub extension: Option<String>,
    pub danger_flag: bool,
    pub origin: Origin,
    pub materialized: bool,
    pub resource_handle: Option<ResourceHandle>,
    pub order_index: usize,
    pub added_at: DateTime<Utc>,
}

impl MediaRecord {
    pub fn from_local(file: LocalFile, classification: Classification) -> Self {
        Self {
            id: MediaId::new(),
            name: file.name.clone(),
            size_bytes: file.size(),
            mime_type: file.mime_type.clone(),
            category: classification.category,
            extension: classification.extension,
            danger_flag: classification.danger_flag,
            origin: Origin::Local(file),
            materialized: false,
            resource_handle: None,
            order_index: 0,
            added_at: Utc::now(),
        }
    }

    pub fn from_remote(
        name: String,
        size_bytes: u64,
        mime_type: String,
        classification: Classification,
        remote: RemoteResource,
    ) -> Self {
        Self {
            id: MediaId::new(),
            name,
            size_bytes,
            mime_type,
            category: classification.category,
            extension: classification.extension,
            danger_flag: classification.danger_flag,
            origin: Origin::Remote(remote),
            materialized: false,
            resource_handle: None,
            order_index: 0,
            added_at: Utc::now(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self.origin, Origin::Local(_))
    }

    pub fn render_strategy(&self) -> RenderStrategy {
        RenderStrategy::select(self.category, self.danger_flag)
    }
}
