//! Archive listing for zip, tar and gzip.
//!
//! Entries are enumerated from the archive index only. Sizes come from the
//! zip central directory and tar headers; entry data is never buffered.
//! Gzip streams have no index, so they are inflated up to a byte limit.

use std::io::{self, Cursor, Read};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use flate2::read::GzDecoder;
use omniview_core::constants::DEFAULT_MAX_DECOMPRESSED_MB;
use omniview_core::models::ArchiveEntry;

use crate::classifier::extension_of;
use crate::traits::ArchiveReader;
use crate::viewers::{is_zip, UnsupportedFormat};

/// Archive format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    Gzip,
}

impl FromStr for ArchiveFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "zip" => Ok(ArchiveFormat::Zip),
            "tar" => Ok(ArchiveFormat::Tar),
            "gz" | "gzip" | "tgz" => Ok(ArchiveFormat::Gzip),
            other => Err(UnsupportedFormat(format!("{} archive", other)).into()),
        }
    }
}

impl ArchiveFormat {
    /// Detect the format from magic bytes, falling back to the file extension.
    pub fn detect(name: &str, data: &[u8]) -> Result<Self> {
        if is_zip(data) {
            return Ok(ArchiveFormat::Zip);
        }
        if data.starts_with(&[0x1F, 0x8B]) {
            return Ok(ArchiveFormat::Gzip);
        }
        if data.len() > 262 && &data[257..262] == b"ustar" {
            return Ok(ArchiveFormat::Tar);
        }
        match extension_of(name) {
            Some(ext) => ext.parse(),
            None => Err(UnsupportedFormat("archive without extension".to_string()).into()),
        }
    }
}

/// Lists zip, tar and gzip-compressed tar archives.
#[derive(Debug, Clone)]
pub struct DefaultArchiveReader {
    max_decompressed_bytes: u64,
}

impl Default for DefaultArchiveReader {
    fn default() -> Self {
        Self {
            max_decompressed_bytes: DEFAULT_MAX_DECOMPRESSED_MB * 1024 * 1024,
        }
    }
}

impl DefaultArchiveReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_decompressed_bytes: u64) -> Self {
        Self {
            max_decompressed_bytes,
        }
    }
}

#[async_trait]
impl ArchiveReader for DefaultArchiveReader {
    async fn list_entries(&self, name: &str, data: Bytes) -> Result<Vec<ArchiveEntry>> {
        let format = ArchiveFormat::detect(name, &data)?;
        let name = name.to_string();
        let limit = self.max_decompressed_bytes;

        tokio::task::spawn_blocking(move || match format {
            ArchiveFormat::Zip => list_zip(&data),
            ArchiveFormat::Tar => list_tar(Cursor::new(&data[..])),
            ArchiveFormat::Gzip => list_gzip(&name, &data, limit),
        })
        .await
        .context("Archive listing task failed")?
    }
}

fn list_zip(data: &[u8]) -> Result<Vec<ArchiveEntry>> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(data)).context("Failed to read ZIP directory")?;

    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let file = archive
            .by_index_raw(index)
            .with_context(|| format!("Failed to read ZIP entry {}", index))?;
        entries.push(ArchiveEntry {
            path: file.name().to_string(),
            uncompressed_size: file.size(),
            compressed_size: Some(file.compressed_size()),
            is_directory: file.is_dir(),
        });
    }

    Ok(entries)
}

fn list_tar<R: io::Read>(reader: R) -> Result<Vec<ArchiveEntry>> {
    let mut archive = tar::Archive::new(reader);
    let mut entries = Vec::new();

    for entry in archive.entries().context("Failed to read TAR headers")? {
        let entry = entry.context("Failed to read TAR entry")?;
        let header = entry.header();
        let path = entry
            .path()
            .context("Invalid TAR entry path")?
            .to_string_lossy()
            .into_owned();
        entries.push(ArchiveEntry {
            path,
            uncompressed_size: header.size().unwrap_or(0),
            compressed_size: None,
            is_directory: header.entry_type().is_dir(),
        });
    }

    Ok(entries)
}

/// A gzip stream is either a compressed tarball or a single compressed file.
///
/// At most `limit` bytes are inflated either way.
fn list_gzip(name: &str, data: &[u8], limit: u64) -> Result<Vec<ArchiveEntry>> {
    if let Ok(entries) = list_tar(GzDecoder::new(data).take(limit)) {
        if !entries.is_empty() {
            return Ok(entries);
        }
    }

    let mut decoder = GzDecoder::new(data).take(limit.saturating_add(1));
    let uncompressed_size =
        io::copy(&mut decoder, &mut io::sink()).context("Failed to decompress gzip stream")?;
    if uncompressed_size > limit {
        return Err(anyhow!("gzip stream expands past the {} byte limit", limit));
    }

    let inner_name = name
        .rsplit(['/', '\\'])
        .next()
        .and_then(|base| {
            base.strip_suffix(".gz")
                .or_else(|| base.strip_suffix(".GZ"))
                .or_else(|| base.strip_suffix(".gzip"))
        })
        .filter(|s| !s.is_empty())
        .unwrap_or("content")
        .to_string();

    Ok(vec![ArchiveEntry {
        path: inner_name,
        uncompressed_size,
        compressed_size: Some(data.len() as u64),
        is_directory: false,
    }])
}
