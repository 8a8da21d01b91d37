//! Spreadsheet parsing: delimited text and XLSX workbooks.

use std::collections::HashMap;
use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;

use omniview_core::constants::DEFAULT_MAX_DECOMPRESSED_MB;

use crate::classifier::extension_of;
use crate::traits::{SpreadsheetParser, Workbook};
use crate::viewers::{is_ole, is_zip, read_zip_text, unescape_xml, UnsupportedFormat};

/// Parse a delimited text file (RFC 4180 quoting).
pub fn parse_delimited(text: &str, delimiter: char) -> Vec<Vec<String>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            c if c == delimiter => row.push(std::mem::take(&mut field)),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}

/// Columns in a worksheet, `A` through `XFD`.
const MAX_COLUMNS: usize = 16_384;

/// Zero-based column index from a cell reference such as `AB12`.
///
/// `Ok(None)` when the reference has no column letters.
fn column_index(reference: &str) -> Result<Option<usize>> {
    let mut index = 0usize;
    let mut seen = false;
    for c in reference.chars().take_while(|c| c.is_ascii_alphabetic()) {
        seen = true;
        let digit = (c.to_ascii_uppercase() as usize) - ('A' as usize) + 1;
        index = index
            .checked_mul(26)
            .and_then(|i| i.checked_add(digit))
            .filter(|i| *i <= MAX_COLUMNS)
            .ok_or_else(|| anyhow!("Cell reference {} is outside the worksheet", reference))?;
    }
    Ok(seen.then(|| index - 1))
}

pub struct DefaultSpreadsheetParser {
    sheet: Regex,
    relationship: Regex,
    attribute: Regex,
    shared_item: Regex,
    text_run: Regex,
    row: Regex,
    cell: Regex,
    value: Regex,
    max_part_bytes: u64,
}

impl DefaultSpreadsheetParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            max_part_bytes: DEFAULT_MAX_DECOMPRESSED_MB * 1024 * 1024,
            sheet: Regex::new(r"<sheet\b([^>]*)/?>").context("Failed to compile sheet pattern")?,
            relationship: Regex::new(r"<Relationship\b([^>]*)/?>")
                .context("Failed to compile relationship pattern")?,
            attribute: Regex::new(r#"([\w:]+)\s*=\s*"([^"]*)""#)
                .context("Failed to compile attribute pattern")?,
            shared_item: Regex::new(r"(?s)<si>(.*?)</si>|<si/>")
                .context("Failed to compile shared string pattern")?,
            text_run: Regex::new(r"(?s)<t(?:\s[^>]*)?>(.*?)</t>")
                .context("Failed to compile text run pattern")?,
            row: Regex::new(r"(?s)<row\b[^>]*?(?:/>|>(.*?)</row>)")
                .context("Failed to compile row pattern")?,
            cell: Regex::new(r"(?s)<c\b([^>]*?)(?:/>|>(.*?)</c>)")
                .context("Failed to compile cell pattern")?,
            value: Regex::new(r"(?s)<v>(.*?)</v>").context("Failed to compile value pattern")?,
        })
    }

    /// Cap on the inflated size of each workbook part.
    pub fn with_part_limit(mut self, max_part_bytes: u64) -> Self {
        self.max_part_bytes = max_part_bytes;
        self
    }

    fn attributes(&self, raw: &str) -> HashMap<String, String> {
        self.attribute
            .captures_iter(raw)
            .map(|caps| (caps[1].to_string(), unescape_xml(&caps[2])))
            .collect()
    }

    fn concat_text_runs(&self, xml: &str) -> String {
        self.text_run
            .captures_iter(xml)
            .map(|caps| unescape_xml(&caps[1]))
            .collect()
    }

    fn parse_delimited_workbook(&self, name: &str, data: &[u8], delimiter: char) -> Workbook {
        let text = String::from_utf8_lossy(data);
        let sheet_name = name
            .rsplit(['/', '\\'])
            .next()
            .and_then(|base| base.rsplit_once('.').map(|(stem, _)| stem))
            .filter(|stem| !stem.is_empty())
            .unwrap_or("Sheet1")
            .to_string();

        let mut sheets = HashMap::new();
        sheets.insert(sheet_name.clone(), parse_delimited(&text, delimiter));
        Workbook {
            sheet_names: vec![sheet_name],
            sheets,
        }
    }

    fn parse_xlsx(&self, data: &[u8]) -> Result<Workbook> {
        let mut archive =
            zip::ZipArchive::new(Cursor::new(data)).context("Failed to open XLSX package")?;

        let limit = self.max_part_bytes;
        let workbook_xml = read_zip_text(&mut archive, "xl/workbook.xml", limit)?
            .ok_or_else(|| anyhow!("xl/workbook.xml missing"))?;
        let rels_xml =
            read_zip_text(&mut archive, "xl/_rels/workbook.xml.rels", limit)?.unwrap_or_default();
        let shared_xml =
            read_zip_text(&mut archive, "xl/sharedStrings.xml", limit)?.unwrap_or_default();

        let targets: HashMap<String, String> = self
            .relationship
            .captures_iter(&rels_xml)
            .filter_map(|caps| {
                let attrs = self.attributes(&caps[1]);
                Some((attrs.get("Id")?.clone(), attrs.get("Target")?.clone()))
            })
            .collect();

        let shared: Vec<String> = self
            .shared_item
            .captures_iter(&shared_xml)
            .map(|caps| {
                caps.get(1)
                    .map(|m| self.concat_text_runs(m.as_str()))
                    .unwrap_or_default()
            })
            .collect();

        let mut workbook = Workbook::default();
        for (position, caps) in self.sheet.captures_iter(&workbook_xml).enumerate() {
            let attrs = self.attributes(&caps[1]);
            let sheet_name = attrs
                .get("name")
                .cloned()
                .unwrap_or_else(|| format!("Sheet{}", position + 1));

            let path = attrs
                .get("r:id")
                .and_then(|id| targets.get(id))
                .map(|target| match target.strip_prefix('/') {
                    Some(absolute) => absolute.to_string(),
                    None => format!("xl/{}", target),
                })
                .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", position + 1));

            let rows = match read_zip_text(&mut archive, &path, limit)? {
                Some(sheet_xml) => self.parse_sheet_rows(&sheet_xml, &shared)?,
                None => {
                    tracing::debug!(sheet = %sheet_name, path = %path, "Worksheet part missing");
                    Vec::new()
                }
            };

            workbook.sheet_names.push(sheet_name.clone());
            workbook.sheets.insert(sheet_name, rows);
        }

        if workbook.sheet_names.is_empty() {
            return Err(anyhow!("Workbook contains no sheets"));
        }

        Ok(workbook)
    }

    fn parse_sheet_rows(&self, sheet_xml: &str, shared: &[String]) -> Result<Vec<Vec<String>>> {
        let mut rows = Vec::new();

        for row_caps in self.row.captures_iter(sheet_xml) {
            let mut cells: Vec<String> = Vec::new();
            let Some(body) = row_caps.get(1) else {
                rows.push(cells);
                continue;
            };

            for cell_caps in self.cell.captures_iter(body.as_str()) {
                let attrs = self.attributes(&cell_caps[1]);
                let inner = cell_caps.get(2).map(|m| m.as_str()).unwrap_or("");
                let raw_value = self
                    .value
                    .captures(inner)
                    .map(|caps| unescape_xml(&caps[1]))
                    .unwrap_or_default();

                let value = match attrs.get("t").map(String::as_str) {
                    Some("s") => raw_value
                        .trim()
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| shared.get(i).cloned())
                        .unwrap_or_default(),
                    Some("b") => match raw_value.trim() {
                        "1" => "TRUE".to_string(),
                        _ => "FALSE".to_string(),
                    },
                    Some("inlineStr") => self.concat_text_runs(inner),
                    _ => raw_value,
                };

                let column = match attrs.get("r") {
                    Some(reference) => column_index(reference)?,
                    None => None,
                }
                .unwrap_or(cells.len());
                if column >= cells.len() {
                    cells.resize(column, String::new());
                    cells.push(value);
                } else {
                    cells[column] = value;
                }
            }

            rows.push(cells);
        }

        Ok(rows)
    }
}

#[async_trait]
impl SpreadsheetParser for DefaultSpreadsheetParser {
    async fn parse(&self, name: &str, data: Bytes) -> Result<Workbook> {
        let extension = extension_of(name);

        match extension.as_deref() {
            Some("csv") => return Ok(self.parse_delimited_workbook(name, &data, ',')),
            Some("tsv") => return Ok(self.parse_delimited_workbook(name, &data, '\t')),
            Some("xls") => {
                return Err(UnsupportedFormat("Legacy Excel workbook (.xls)".to_string()).into())
            }
            Some("ods") => {
                return Err(UnsupportedFormat("OpenDocument spreadsheet".to_string()).into())
            }
            _ => {}
        }

        if is_zip(&data) {
            return self.parse_xlsx(&data);
        }
        if is_ole(&data) {
            return Err(UnsupportedFormat("Legacy Excel workbook (.xls)".to_string()).into());
        }

        Ok(self.parse_delimited_workbook(name, &data, ','))
    }
}
