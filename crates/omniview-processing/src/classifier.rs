//! Name/MIME classification.
//!
//! Classification is a pure lookup: the final extension is checked against the
//! dangerous set first, then the safe category tables, then the MIME type.
//! Only the last extension counts, so `invoice.pdf.exe` is an executable.

use omniview_core::models::{Category, Classification};

/// Extensions that are never rendered as anything but plain text.
const DANGEROUS_EXTENSIONS: &[&str] = &[
    // Executables and installers
    "exe", "msi", "app", "deb", "rpm", "dmg", "pkg",
    // Scripts
    "bat", "cmd", "ps1", "sh", "bash", "zsh", "fish", "vbs", "vbe", "js", "jse", "wsf", "wsh",
    "py", "pyw", "rb", "pl", "php", "asp", "jsp",
    // System and library files
    "scr", "pif", "com", "cpl", "dll", "sys", "drv", "ocx", "ax", "gadget", "msc", "jar",
    // Macro-enabled office formats
    "xlsm", "xltm", "docm", "dotm", "pptm", "potm", "ppam",
    // Archives that commonly smuggle executables
    "rar", "7z", "cab", "ace", "arj", "lzh", "tgz",
    // Windows shell and registry artifacts
    "reg", "inf", "ade", "adp", "chm", "hta", "ins", "isp", "job", "lnk", "mad", "mdb", "mde",
    "mdt", "mdw", "mdz", "ops", "pcd", "prf", "prg", "pst", "scf", "sct", "shb", "shs", "url",
    "vb", "wsc",
];

/// Extract the lower-cased extension of the final path component.
///
/// Returns `None` when the name has no `.` or ends with one.
pub fn extension_of(name: &str) -> Option<String> {
    let file_name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

pub fn is_dangerous_extension(ext: &str) -> bool {
    DANGEROUS_EXTENSIONS.contains(&ext)
}

/// Classify a file by name and declared MIME type. Never fails.
pub fn classify(name: &str, mime_type: &str) -> Classification {
    let extension = extension_of(name);

    if let Some(ext) = extension.as_deref() {
        if is_dangerous_extension(ext) {
            return Classification {
                category: dangerous_display_category(ext),
                danger_flag: true,
                extension,
            };
        }

        if let Some(category) = category_for_extension(ext) {
            return Classification {
                category,
                danger_flag: false,
                extension,
            };
        }
    }

    let category = category_for_mime(mime_type).unwrap_or(Category::Unsupported);
    Classification {
        category,
        danger_flag: false,
        extension,
    }
}

/// Descriptive category for a dangerous extension. Display only.
fn dangerous_display_category(ext: &str) -> Category {
    match ext {
        "docm" | "dotm" | "pptm" | "potm" | "ppam" => Category::Document,
        "xlsm" | "xltm" => Category::Spreadsheet,
        "rar" | "7z" | "cab" | "ace" | "arj" | "lzh" | "tgz" => Category::Archive,
        "bat" | "cmd" | "ps1" | "sh" | "bash" | "zsh" | "fish" | "vbs" | "vbe" | "js" | "jse"
        | "wsf" | "wsh" | "py" | "pyw" | "rb" | "pl" | "php" | "asp" | "jsp" | "vb" => {
            Category::Code
        }
        "reg" | "inf" | "url" => Category::Text,
        _ => Category::Unsupported,
    }
}

/// Safe extension tables.
pub fn category_for_extension(ext: &str) -> Option<Category> {
    let category = match ext {
        // Images
        "jpg" | "jpeg" | "png" | "gif" | "bmp" | "svg" | "webp" | "ico" | "tiff" | "tif"
        | "avif" | "raw" | "cr2" | "nef" | "arw" | "dng" => Category::Image,
        // Audio
        "mp3" | "wav" | "ogg" | "aac" | "flac" | "m4a" | "wma" | "opus" | "aiff" | "au" | "ra"
        | "amr" | "ac3" | "dts" => Category::Audio,
        // Video
        "mp4" | "webm" | "avi" | "mov" | "mkv" | "flv" | "wmv" | "mpg" | "mpeg" | "m4v" | "3gp"
        | "ogv" | "rm" | "rmvb" | "asf" => Category::Video,
        "pdf" => Category::Pdf,
        // Documents
        "doc" | "docx" | "rtf" | "odt" | "odp" | "ppt" | "pptx" | "epub" | "mobi" => {
            Category::Document
        }
        // Spreadsheets
        "xls" | "xlsx" | "ods" | "csv" | "tsv" => Category::Spreadsheet,
        // Plain text and markup
        "txt" | "md" | "markdown" | "rst" | "log" | "ini" | "cfg" | "conf" | "json" | "xml"
        | "yaml" | "yml" | "toml" | "html" | "htm" => Category::Text,
        // Source code
        "css" | "c" | "cpp" | "h" | "hpp" | "java" | "kt" | "swift" | "go" | "rs" | "rust"
        | "dart" | "lua" | "r" | "sql" | "gradle" | "ts" | "tsx" | "jsx" => Category::Code,
        // Archives
        "zip" | "tar" | "gz" | "bz2" | "xz" | "lz4" | "zst" => Category::Archive,
        _ => return None,
    };
    Some(category)
}

/// MIME fallback used when the extension is missing or unknown.
pub fn category_for_mime(mime_type: &str) -> Option<Category> {
    let normalized = mime_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    if normalized.is_empty() {
        return None;
    }

    let category = match normalized.as_str() {
        "application/pdf" => Category::Pdf,
        "text/csv" | "text/tab-separated-values" => Category::Spreadsheet,
        "application/json" | "application/xml" | "application/yaml" | "application/toml" => {
            Category::Text
        }
        "application/zip" | "application/x-tar" | "application/gzip" | "application/x-gzip" => {
            Category::Archive
        }
        "application/msword"
        | "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
            Category::Document
        }
        "application/vnd.ms-excel"
        | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
            Category::Spreadsheet
        }
        other if other.starts_with("image/") => Category::Image,
        other if other.starts_with("audio/") => Category::Audio,
        other if other.starts_with("video/") => Category::Video,
        other if other.starts_with("text/") => Category::Text,
        other if other.ends_with("+json") || other.ends_with("+xml") => Category::Text,
        _ => return None,
    };
    Some(category)
}

/// Content type to label local bytes with when none was declared.
pub fn expected_content_type(ext: &str) -> Option<&'static str> {
    let content_type = match ext {
        // Images
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "tif" | "tiff" => "image/tiff",
        // Videos
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "m4v" => "video/x-m4v",
        "ogv" => "video/ogg",
        // Audio
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        "aac" => "audio/aac",
        "opus" => "audio/opus",
        // Documents
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "txt" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "json" => "application/json",
        "xml" => "application/xml",
        "zip" => "application/zip",
        "tar" => "application/x-tar",
        "gz" => "application/gzip",
        _ => return None,
    };
    Some(content_type)
}

/// Syntax highlighting hint for text and code.
pub fn language_for(ext: &str) -> Option<&'static str> {
    let language = match ext {
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "py" | "pyw" => "python",
        "rb" => "ruby",
        "rs" | "rust" => "rust",
        "go" => "go",
        "java" => "java",
        "kt" => "kotlin",
        "swift" => "swift",
        "dart" => "dart",
        "lua" => "lua",
        "r" => "r",
        "c" | "h" => "c",
        "cpp" | "hpp" => "cpp",
        "php" => "php",
        "pl" => "perl",
        "sh" | "bash" | "zsh" | "fish" => "bash",
        "ps1" => "powershell",
        "sql" => "sql",
        "gradle" => "groovy",
        "html" | "htm" => "html",
        "css" => "css",
        "json" => "json",
        "xml" => "xml",
        "yml" | "yaml" => "yaml",
        "toml" => "toml",
        "ini" | "cfg" | "conf" => "ini",
        "md" | "markdown" => "markdown",
        _ => return None,
    };
    Some(language)
}
