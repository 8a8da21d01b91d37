use serde::{Deserialize, Serialize};

use crate::error::{ErrorMetadata, ViewerError};

/// Word and character counts for a converted document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub words: usize,
    pub characters: usize,
    pub characters_no_spaces: usize,
}

impl DocumentStats {
    pub fn from_text(text: &str) -> Self {
        Self {
            words: text.split_whitespace().count(),
            characters: text.chars().count(),
            characters_no_spaces: text.chars().filter(|c| !c.is_whitespace()).count(),
        }
    }
}

/// First sheet of a workbook plus the names of every sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetPreview {
    pub sheet_names: Vec<String>,
    pub active_sheet: String,
    pub rows: Vec<Vec<String>>,
    /// Rows were cut at the preview limit
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub path: String,
    pub uncompressed_size: u64,
    pub compressed_size: Option<u64>,
    pub is_directory: bool,
}

/// Output of materializing a record. Failures are carried as the `Error`
/// variant so nothing escapes the dispatcher as an `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderedContent {
    Image {
        src: String,
    },
    Audio {
        src: String,
    },
    Video {
        src: String,
        /// Source is a third-party player page, not a media file
        embedded: bool,
    },
    Pdf {
        src: String,
        page_count: Option<u32>,
    },
    Document {
        html: String,
        warnings: Vec<String>,
        stats: DocumentStats,
    },
    Spreadsheet(SheetPreview),
    Text {
        content: String,
        language: Option<String>,
        line_count: usize,
        truncated: bool,
    },
    Archive {
        entries: Vec<ArchiveEntry>,
        file_count: usize,
        total_size: u64,
        compressed_size: u64,
    },
    TextOnly {
        banner: String,
        content: String,
        truncated: bool,
    },
    Error {
        code: String,
        message: String,
    },
}

impl RenderedContent {
    pub fn from_error(err: &ViewerError) -> Self {
        RenderedContent::Error {
            code: err.error_code().to_string(),
            message: err.client_message(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RenderedContent::Error { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RenderedContent::Image { .. } => "image",
            RenderedContent::Audio { .. } => "audio",
            RenderedContent::Video { .. } => "video",
            RenderedContent::Pdf { .. } => "pdf",
            RenderedContent::Document { .. } => "document",
            RenderedContent::Spreadsheet(_) => "spreadsheet",
            RenderedContent::Text { .. } => "text",
            RenderedContent::Archive { .. } => "archive",
            RenderedContent::TextOnly { .. } => "text_only",
            RenderedContent::Error { .. } => "error",
        }
    }
}
