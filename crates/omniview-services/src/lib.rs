//! Omniview Services Layer
//!
//! This crate is the session layer: it resolves pasted URLs, owns the bounded
//! live set, tracks resource handle lifetimes and locks persistent storage.
//! [`ViewerSession`] ties these together with the dispatcher from
//! omniview-processing so a front end depends on a single facade.

pub mod http;
pub mod ingest;
pub mod lifetime;
pub mod resolver;
pub mod session;
pub mod storage_lock;

pub use http::HttpFetch;
pub use ingest::{IngestFailure, IngestInput, IngestReport, IngestionPipeline};
pub use lifetime::LifetimeGuard;
pub use resolver::{RemoteResourceResolver, ResolvedResource};
pub use session::ViewerSession;
pub use storage_lock::{GuardedStorage, MemoryStore, PersistentStore, StorageKind, StorageLock};

pub use omniview_processing::{
    Collaborators, DispatchLimits, HandleIssuer, Materialized, NetworkFetch, ObjectUrlRegistry,
};
