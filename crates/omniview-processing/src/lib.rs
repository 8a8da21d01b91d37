//! Omniview Processing Library
//!
//! Classification of dropped files, the default viewers (documents,
//! spreadsheets, archives, PDF) and the dispatcher that materializes records.

pub mod classifier;
pub mod dispatch;
pub mod handles;
pub mod sanitize;
pub mod traits;
pub mod viewers;

pub use classifier::{classify, extension_of, language_for};
pub use dispatch::{Collaborators, DispatchLimits, Materialized, ViewerDispatcher};
pub use handles::ObjectUrlRegistry;
pub use sanitize::HtmlSanitizer;
pub use traits::{
    ArchiveReader, ConvertedDocument, DocumentConverter, HandleIssuer, IssuedHandle,
    NetworkFetch, PdfRenderer, PdfSource, PdfView, ProbeResponse, SpreadsheetParser, Workbook,
};
pub use viewers::UnsupportedFormat;
