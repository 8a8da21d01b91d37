//! Omniview Core Library
//!
//! This crate provides the domain models, error types and configuration shared
//! by the classification, dispatch and session crates.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::ViewerConfig;
pub use error::{ErrorMetadata, LogLevel, ViewerError, ViewerResult};
pub use models::{
    ArchiveEntry, Category, Classification, DocumentStats, EmbedProvider, LocalFile, MediaId,
    MediaRecord, Origin, RemoteResource, RenderStrategy, RenderedContent, ResourceHandle,
    SheetPreview,
};
