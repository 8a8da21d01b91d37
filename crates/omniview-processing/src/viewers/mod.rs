//! Default collaborator implementations.

pub mod archive;
pub mod document;
pub mod pdf;
pub mod spreadsheet;

use std::io::Read;

use anyhow::{anyhow, Context};

use crate::sanitize::{decode_references, xml_entity};

pub use archive::{ArchiveFormat, DefaultArchiveReader};
pub use document::DocxConverter;
pub use pdf::EmbedPdfRenderer;
pub use spreadsheet::DefaultSpreadsheetParser;

/// Raised by a collaborator when the input is recognised but has no parser.
#[derive(Debug, thiserror::Error)]
#[error("{0} is not supported")]
pub struct UnsupportedFormat(pub String);

/// Decode the five predefined XML entities and numeric character references.
pub(crate) fn unescape_xml(text: &str) -> String {
    decode_references(text, xml_entity)
}

/// Read one member of an OOXML package as text. `Ok(None)` when absent.
///
/// Members that inflate past `limit` bytes are an error.
pub(crate) fn read_zip_text<R: std::io::Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    path: &str,
    limit: u64,
) -> anyhow::Result<Option<String>> {
    let file = match archive.by_name(path) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to open {}", path)),
    };
    if file.size() > limit {
        return Err(anyhow!(
            "{} expands to {} bytes, over the {} byte limit",
            path,
            file.size(),
            limit
        ));
    }

    let mut text = String::new();
    file.take(limit.saturating_add(1))
        .read_to_string(&mut text)
        .with_context(|| format!("Failed to read {}", path))?;
    if text.len() as u64 > limit {
        return Err(anyhow!("{} expands past the {} byte limit", path, limit));
    }
    Ok(Some(text))
}

pub(crate) fn is_zip(data: &[u8]) -> bool {
    data.starts_with(b"PK\x03\x04") || data.starts_with(b"PK\x05\x06")
}

/// OLE compound file, used by legacy Office formats.
pub(crate) fn is_ole(data: &[u8]) -> bool {
    data.starts_with(&[0xD0, 0xCF, 0x11, 0xE0])
}
