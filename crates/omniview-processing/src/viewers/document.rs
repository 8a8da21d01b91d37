//! DOCX to HTML conversion.
//!
//! Walks `word/document.xml` and emits headings, paragraphs, list items,
//! tables and basic run formatting. Embedded images are skipped with a
//! warning. The output still goes through the sanitizer before display.

use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use omniview_core::constants::DEFAULT_MAX_DECOMPRESSED_MB;
use regex::Regex;

use crate::sanitize::escape_html;
use crate::traits::{ConvertedDocument, DocumentConverter};
use crate::viewers::{is_ole, is_zip, read_zip_text, unescape_xml, UnsupportedFormat};

pub struct DocxConverter {
    token: Regex,
    attr_val: Regex,
    max_part_bytes: u64,
}

#[derive(Default)]
struct RunStyle {
    bold: bool,
    italic: bool,
    underline: bool,
    strike: bool,
}

#[derive(Default)]
struct ParagraphState {
    html: String,
    text: String,
    heading: Option<u8>,
    list_item: bool,
}

impl DocxConverter {
    pub fn new() -> Result<Self> {
        let token = Regex::new(r"<(/?)([A-Za-z][\w:.-]*)([^>]*?)(/?)>|([^<]+)")
            .context("Failed to compile WordprocessingML token pattern")?;
        let attr_val = Regex::new(r#"w:val\s*=\s*"([^"]*)""#)
            .context("Failed to compile w:val pattern")?;
        Ok(Self {
            token,
            attr_val,
            max_part_bytes: DEFAULT_MAX_DECOMPRESSED_MB * 1024 * 1024,
        })
    }

    /// Cap on the inflated size of `word/document.xml`.
    pub fn with_part_limit(mut self, max_part_bytes: u64) -> Self {
        self.max_part_bytes = max_part_bytes;
        self
    }

    fn val<'a>(&self, attrs: &'a str) -> Option<&'a str> {
        self.attr_val
            .captures(attrs)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    /// Toggle properties like `<w:b/>` are on unless explicitly disabled.
    fn toggle_on(&self, attrs: &str) -> bool {
        !matches!(self.val(attrs), Some("0" | "false" | "none"))
    }

    fn convert_xml(&self, xml: &str) -> ConvertedDocument {
        let mut html = String::new();
        let mut plain = Vec::new();
        let mut paragraph: Option<ParagraphState> = None;
        let mut run = RunStyle::default();
        let mut in_text = false;
        let mut in_list = false;
        let mut fallback_depth = 0usize;
        let mut images = 0usize;
        let mut unsupported_chunks = 0usize;

        for caps in self.token.captures_iter(xml) {
            if let Some(text) = caps.get(5) {
                if in_text && fallback_depth == 0 {
                    if let Some(p) = paragraph.as_mut() {
                        let decoded = unescape_xml(text.as_str());
                        p.html.push_str(&wrap_run(&escape_html(&decoded), &run));
                        p.text.push_str(&decoded);
                    }
                }
                continue;
            }

            let closing = !caps[1].is_empty();
            let name = &caps[2];
            let attrs = &caps[3];
            let self_closing = !caps[4].is_empty();

            if name == "mc:Fallback" {
                if closing {
                    fallback_depth = fallback_depth.saturating_sub(1);
                } else if !self_closing {
                    fallback_depth += 1;
                }
                continue;
            }
            if fallback_depth > 0 {
                continue;
            }

            match (name, closing) {
                ("w:p", false) => {
                    paragraph = Some(ParagraphState::default());
                    if self_closing {
                        paragraph = None;
                    }
                }
                ("w:p", true) => {
                    if let Some(p) = paragraph.take() {
                        emit_paragraph(&mut html, &mut in_list, p, &mut plain);
                    }
                }
                ("w:pStyle", false) => {
                    if let (Some(p), Some(style)) = (paragraph.as_mut(), self.val(attrs)) {
                        p.heading = heading_level(style);
                    }
                }
                ("w:numPr", false) => {
                    if let Some(p) = paragraph.as_mut() {
                        p.list_item = true;
                    }
                }
                ("w:r", false) => run = RunStyle::default(),
                ("w:b", false) => run.bold = self.toggle_on(attrs),
                ("w:i", false) => run.italic = self.toggle_on(attrs),
                ("w:u", false) => run.underline = self.toggle_on(attrs),
                ("w:strike", false) => run.strike = self.toggle_on(attrs),
                ("w:t", false) => in_text = !self_closing,
                ("w:t", true) => in_text = false,
                ("w:tab", false) => {
                    if let Some(p) = paragraph.as_mut() {
                        p.html.push(' ');
                        p.text.push('\t');
                    }
                }
                ("w:br" | "w:cr", false) => {
                    if let Some(p) = paragraph.as_mut() {
                        p.html.push_str("<br>");
                        p.text.push('\n');
                    }
                }
                ("w:drawing" | "w:pict", false) => images += 1,
                ("w:altChunk", false) => unsupported_chunks += 1,
                ("w:tbl", false) => {
                    close_list(&mut html, &mut in_list);
                    html.push_str("<table>");
                }
                ("w:tbl", true) => {
                    close_list(&mut html, &mut in_list);
                    html.push_str("</table>");
                }
                ("w:tr", false) => html.push_str("<tr>"),
                ("w:tr", true) => html.push_str("</tr>"),
                ("w:tc", false) => html.push_str("<td>"),
                ("w:tc", true) => {
                    close_list(&mut html, &mut in_list);
                    html.push_str("</td>");
                }
                _ => {}
            }
        }

        close_list(&mut html, &mut in_list);

        let mut warnings = Vec::new();
        if images > 0 {
            warnings.push(format!("{} embedded image(s) were not rendered", images));
        }
        if unsupported_chunks > 0 {
            warnings.push(format!(
                "{} embedded external chunk(s) were skipped",
                unsupported_chunks
            ));
        }

        ConvertedDocument {
            html,
            warnings,
            plain_text: plain.join("\n"),
        }
    }
}

fn heading_level(style: &str) -> Option<u8> {
    let lower = style.to_lowercase();
    if lower == "title" {
        return Some(1);
    }
    lower
        .strip_prefix("heading")
        .and_then(|n| n.trim().parse::<u8>().ok())
        .filter(|n| (1..=6).contains(n))
}

fn wrap_run(text: &str, run: &RunStyle) -> String {
    let mut out = text.to_string();
    if run.strike {
        out = format!("<s>{}</s>", out);
    }
    if run.underline {
        out = format!("<u>{}</u>", out);
    }
    if run.italic {
        out = format!("<em>{}</em>", out);
    }
    if run.bold {
        out = format!("<strong>{}</strong>", out);
    }
    out
}

fn close_list(html: &mut String, in_list: &mut bool) {
    if *in_list {
        html.push_str("</ul>");
        *in_list = false;
    }
}

fn emit_paragraph(
    html: &mut String,
    in_list: &mut bool,
    p: ParagraphState,
    plain: &mut Vec<String>,
) {
    if p.text.trim().is_empty() {
        return;
    }

    if p.list_item {
        if !*in_list {
            html.push_str("<ul>");
            *in_list = true;
        }
        html.push_str(&format!("<li>{}</li>", p.html));
    } else {
        close_list(html, in_list);
        match p.heading {
            Some(level) => html.push_str(&format!("<h{0}>{1}</h{0}>", level, p.html)),
            None => html.push_str(&format!("<p>{}</p>", p.html)),
        }
    }
    plain.push(p.text);
}

#[async_trait]
impl DocumentConverter for DocxConverter {
    async fn convert_to_html(&self, name: &str, data: Bytes) -> Result<ConvertedDocument> {
        if is_ole(&data) {
            return Err(UnsupportedFormat("Legacy Word document (.doc)".to_string()).into());
        }
        if !is_zip(&data) {
            return Err(anyhow!("{} is not a DOCX package", name));
        }

        let mut archive =
            zip::ZipArchive::new(Cursor::new(&data[..])).context("Failed to open DOCX package")?;
        let xml = match read_zip_text(&mut archive, "word/document.xml", self.max_part_bytes)? {
            Some(xml) => xml,
            None if archive.file_names().any(|n| n.starts_with("ppt/")) => {
                return Err(UnsupportedFormat("Presentation".to_string()).into());
            }
            None => return Err(anyhow!("word/document.xml missing from {}", name)),
        };

        Ok(self.convert_xml(&xml))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::{FileOptions, ZipWriter};

    fn build_docx(body: &str) -> Vec<u8> {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        );
        let mut buffer = Vec::new();
        {
            let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
            zip.start_file("word/document.xml", FileOptions::default())
                .unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buffer
    }

    #[tokio::test]
    async fn test_headings_and_formatting() {
        let body = concat!(
            r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Report</w:t></w:r></w:p>"#,
            r#"<w:p><w:r><w:t xml:space="preserve">Plain </w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>bold</w:t></w:r>"#,
            r#"<w:r><w:rPr><w:i/></w:rPr><w:t> &amp; italic</w:t></w:r></w:p>"#,
        );
        let converter = DocxConverter::new().unwrap();
        let doc = converter
            .convert_to_html("report.docx", Bytes::from(build_docx(body)))
            .await
            .unwrap();

        assert_eq!(
            doc.html,
            "<h1>Report</h1><p>Plain <strong>bold</strong><em> &amp; italic</em></p>"
        );
        assert_eq!(doc.plain_text, "Report\nPlain bold & italic");
        assert!(doc.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_lists_tables_and_images() {
        let body = concat!(
            r#"<w:p><w:pPr><w:numPr><w:ilvl w:val="0"/></w:numPr></w:pPr><w:r><w:t>one</w:t></w:r></w:p>"#,
            r#"<w:p><w:pPr><w:numPr><w:ilvl w:val="0"/></w:numPr></w:pPr><w:r><w:t>two</w:t></w:r></w:p>"#,
            r#"<w:tbl><w:tr><w:tc><w:p><w:r><w:t>cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#,
            r#"<w:p><w:r><w:drawing><wp:inline/></w:drawing></w:r></w:p>"#,
        );
        let converter = DocxConverter::new().unwrap();
        let doc = converter
            .convert_to_html("list.docx", Bytes::from(build_docx(body)))
            .await
            .unwrap();

        assert_eq!(
            doc.html,
            "<ul><li>one</li><li>two</li></ul><table><tr><td><p>cell</p></td></tr></table>"
        );
        assert_eq!(doc.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_text_is_escaped() {
        let body = r#"<w:p><w:r><w:t>&lt;script&gt;alert(1)&lt;/script&gt;</w:t></w:r></w:p>"#;
        let doc = DocxConverter::new()
            .unwrap()
            .convert_to_html("x.docx", Bytes::from(build_docx(body)))
            .await
            .unwrap();
        assert_eq!(doc.html, "<p>&lt;script&gt;alert(1)&lt;/script&gt;</p>");
    }

    #[tokio::test]
    async fn test_legacy_doc_is_unsupported() {
        let err = DocxConverter::new()
            .unwrap()
            .convert_to_html("old.doc", Bytes::from_static(&[0xD0, 0xCF, 0x11, 0xE0, 0, 0]))
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<UnsupportedFormat>().is_some());
    }

    #[tokio::test]
    async fn test_not_a_package() {
        let result = DocxConverter::new()
            .unwrap()
            .convert_to_html("fake.docx", Bytes::from_static(b"hello"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_inflated_document_over_limit() {
        let body = format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", "a".repeat(8192));
        let err = DocxConverter::new()
            .unwrap()
            .with_part_limit(4096)
            .convert_to_html("big.docx", Bytes::from(build_docx(&body)))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("limit"));
    }

    #[test]
    fn test_heading_level() {
        assert_eq!(heading_level("Heading2"), Some(2));
        assert_eq!(heading_level("Title"), Some(1));
        assert_eq!(heading_level("Normal"), None);
        assert_eq!(heading_level("Heading9"), None);
    }
}
