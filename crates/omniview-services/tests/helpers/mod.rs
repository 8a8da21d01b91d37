//! Test helpers: build sessions and fixture files for integration tests.
//!
//! Run from workspace root: `cargo test -p omniview-services --test session_scenarios`.

pub mod fixtures;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use omniview_core::config::ViewerConfig;
use omniview_processing::traits::{NetworkFetch, ProbeResponse};
use omniview_services::{Collaborators, HttpFetch, ObjectUrlRegistry, ViewerSession};

/// Network stand-in that refuses every request.
pub struct OfflineFetch;

#[async_trait]
impl NetworkFetch for OfflineFetch {
    async fn head(&self, url: &str) -> anyhow::Result<ProbeResponse> {
        Err(anyhow::anyhow!("offline: HEAD {}", url))
    }

    async fn get(&self, url: &str, _max_bytes: u64) -> anyhow::Result<Bytes> {
        Err(anyhow::anyhow!("offline: GET {}", url))
    }
}

/// Session plus the registry behind its object URLs.
pub struct TestSession {
    pub session: Arc<ViewerSession>,
    pub handles: Arc<ObjectUrlRegistry>,
}

pub fn offline_session() -> TestSession {
    session_with(ViewerConfig::default(), Arc::new(OfflineFetch))
}

pub fn http_session(config: ViewerConfig) -> TestSession {
    let fetch = HttpFetch::from_config(&config).expect("http client");
    session_with(config, Arc::new(fetch))
}

pub fn session_with(config: ViewerConfig, fetch: Arc<dyn NetworkFetch>) -> TestSession {
    let handles = Arc::new(ObjectUrlRegistry::new());
    let collaborators =
        Collaborators::with_defaults(fetch, handles.clone()).expect("default collaborators");
    let session = ViewerSession::new(config, collaborators).expect("session");
    TestSession {
        session: Arc::new(session),
        handles,
    }
}
