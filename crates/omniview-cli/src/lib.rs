use std::path::Path;

use anyhow::Context;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use omniview_core::models::{LocalFile, RenderedContent};
use omniview_services::IngestInput;

/// Truncate a string to max_len characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Human-readable size; "unknown" for 0.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "unknown".to_string();
    }
    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut size = bytes as f64 / 1024.0;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

/// One-line description of rendered content for table output.
pub fn summarize(content: &RenderedContent) -> String {
    match content {
        RenderedContent::Image { src } | RenderedContent::Audio { src } => {
            truncate_string(src, 48)
        }
        RenderedContent::Video { src, embedded } => {
            let label = if *embedded { "embed " } else { "" };
            format!("{}{}", label, truncate_string(src, 48))
        }
        RenderedContent::Pdf { page_count, .. } => match page_count {
            Some(pages) => format!("{} page(s)", pages),
            None => "page count unknown".to_string(),
        },
        RenderedContent::Document {
            stats, warnings, ..
        } => format!("{} words, {} warning(s)", stats.words, warnings.len()),
        RenderedContent::Spreadsheet(preview) => format!(
            "{} sheet(s), {} row(s){}",
            preview.sheet_names.len(),
            preview.rows.len(),
            if preview.truncated { " (truncated)" } else { "" }
        ),
        RenderedContent::Text {
            line_count,
            language,
            ..
        } => format!(
            "{} line(s){}",
            line_count,
            language
                .as_deref()
                .map(|l| format!(", {}", l))
                .unwrap_or_default()
        ),
        RenderedContent::Archive {
            file_count,
            total_size,
            ..
        } => format!("{} file(s), {}", file_count, format_bytes(*total_size)),
        RenderedContent::TextOnly { banner, .. } => truncate_string(banner, 48),
        RenderedContent::Error { code, message } => {
            format!("{}: {}", code, truncate_string(message, 40))
        }
    }
}

/// Turn a command-line argument into an ingest input.
///
/// Existing paths are read into memory; everything else is treated as a URL.
pub async fn read_input(arg: &str) -> anyhow::Result<IngestInput> {
    let path = Path::new(arg);
    if arg.contains("://") || !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(IngestInput::url(arg));
    }

    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Failed to stat {}", path.display()))?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| arg.to_string());

    let mut file = LocalFile::new(name, "", Bytes::from(data));
    file.last_modified = metadata.modified().ok().map(DateTime::<Utc>::from);
    Ok(IngestInput::Local(file))
}

/// Initialize tracing for the CLI. Logs go to stderr so JSON output stays clean.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,omniview=info")),
        )
        .init();
}
