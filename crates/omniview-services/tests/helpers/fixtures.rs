//! Fixture files.

use std::io::{Cursor, Write};

use bytes::Bytes;
use omniview_core::models::LocalFile;
use omniview_services::IngestInput;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

pub fn local_file(name: &str, size: usize) -> IngestInput {
    IngestInput::Local(LocalFile::new(name, "", Bytes::from(vec![b'x'; size])))
}

pub fn local_with(name: &str, mime_type: &str, data: impl Into<Bytes>) -> IngestInput {
    IngestInput::Local(LocalFile::new(name, mime_type, data.into()))
}

/// Minimal DOCX whose body is the given WordprocessingML.
pub fn docx(body: &str) -> Vec<u8> {
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
        body
    );

    let mut buffer = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file("word/document.xml", options).unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buffer
}

/// Zip with the given (path, contents) entries.
pub fn zip_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buffer = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        for (path, contents) in entries {
            zip.start_file(*path, options).unwrap();
            zip.write_all(contents).unwrap();
        }
        zip.finish().unwrap();
    }
    buffer
}
