//! The owned viewer session.
//!
//! A [`ViewerSession`] holds the live set, the dispatcher cache and every
//! lifetime guard. Nothing is global; dropping or tearing down the session
//! releases everything it issued.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use omniview_core::config::ViewerConfig;
use omniview_core::error::{ViewerError, ViewerResult};
use omniview_core::models::{MediaId, MediaRecord, ResourceHandle};
use omniview_processing::dispatch::{Collaborators, DispatchLimits, Materialized, ViewerDispatcher};
use omniview_processing::handles::ObjectUrlRegistry;
use tokio::time::interval;

use crate::http::HttpFetch;
use crate::ingest::{IngestInput, IngestReport, IngestionPipeline};
use crate::lifetime::LifetimeGuard;
use crate::resolver::RemoteResourceResolver;
use crate::storage_lock::StorageLock;

pub struct ViewerSession {
    config: ViewerConfig,
    pipeline: IngestionPipeline,
    dispatcher: ViewerDispatcher,
    guard: LifetimeGuard,
}

impl ViewerSession {
    pub fn new(config: ViewerConfig, collaborators: Collaborators) -> anyhow::Result<Self> {
        Self::with_storage(config, collaborators, StorageLock::in_memory())
    }

    pub fn with_storage(
        config: ViewerConfig,
        collaborators: Collaborators,
        storage: StorageLock,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let resolver = RemoteResourceResolver::new(collaborators.fetch.clone(), &config);
        let pipeline =
            IngestionPipeline::new(resolver, config.max_records, config.resolve_concurrency)
                .with_max_file_bytes(config.max_file_bytes);
        let guard = LifetimeGuard::new(
            collaborators.handles.clone(),
            config.sweep_interval,
            storage,
        );
        let dispatcher = ViewerDispatcher::new(collaborators, DispatchLimits::from(&config))?;

        if config.lock_storage {
            guard.lock_storage();
        }

        tracing::info!(
            max_records = config.max_records,
            probe_remote = config.probe_remote,
            lock_storage = config.lock_storage,
            "Viewer session started"
        );

        Ok(Self {
            config,
            pipeline,
            dispatcher,
            guard,
        })
    }

    /// Session backed by reqwest and the in-memory object URL registry.
    pub fn with_defaults(config: ViewerConfig) -> anyhow::Result<(Self, Arc<ObjectUrlRegistry>)> {
        let handles = Arc::new(ObjectUrlRegistry::new());
        let fetch = Arc::new(HttpFetch::from_config(&config)?);
        let collaborators = Collaborators::for_config(fetch, handles.clone(), &config)?;
        Ok((Self::new(config, collaborators)?, handles))
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn guard(&self) -> &LifetimeGuard {
        &self.guard
    }

    pub async fn ingest(&self, inputs: Vec<IngestInput>) -> IngestReport {
        self.pipeline.ingest(inputs).await
    }

    pub async fn ingest_single_url(&self, raw_url: &str) -> ViewerResult<MediaRecord> {
        self.pipeline.ingest_single_url(raw_url).await
    }

    /// Materialize a live record, decoding it on first use only.
    ///
    /// If the record leaves the live set while decoding, the result is
    /// discarded and any handle it produced is released.
    #[tracing::instrument(skip(self), fields(media.id = %id))]
    pub async fn materialize(&self, id: MediaId) -> ViewerResult<Arc<Materialized>> {
        let record = self
            .pipeline
            .get(id)
            .await
            .ok_or(ViewerError::RecordNotFound(id))?;

        let materialized = self.dispatcher.materialize(&record).await;

        if !self
            .pipeline
            .mark_materialized(id, materialized.handle.clone())
            .await
        {
            tracing::debug!("Record removed during materialization; discarding result");
            self.dispatcher.forget(&id);
            if let Some(handle) = &materialized.handle {
                self.guard.release(handle);
            }
            return Err(ViewerError::RecordNotFound(id));
        }

        if let Some(handle) = &materialized.handle {
            self.guard.track(id, handle.clone());
        }

        Ok(materialized)
    }

    pub async fn remove(&self, id: MediaId) -> ViewerResult<MediaRecord> {
        let record = self.pipeline.remove(id).await?;
        self.release_record(&record);
        Ok(record)
    }

    pub async fn reorder(&self, from: usize, to: usize) -> ViewerResult<()> {
        self.pipeline.reorder(from, to).await
    }

    /// Keep only the `keep` most recent records, releasing the rest.
    pub async fn prune_to_recent(&self, keep: usize) -> usize {
        let pruned = self.pipeline.prune_to_recent(keep).await;
        for record in &pruned {
            self.release_record(record);
        }
        pruned.len()
    }

    pub async fn snapshot(&self) -> Vec<MediaRecord> {
        self.pipeline.snapshot().await
    }

    pub async fn get(&self, id: MediaId) -> Option<MediaRecord> {
        self.pipeline.get(id).await
    }

    pub async fn len(&self) -> usize {
        self.pipeline.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.pipeline.is_empty().await
    }

    /// Visibility hook. Hiding the view purges the session when configured to.
    pub async fn on_visibility_change(&self, hidden: bool) -> bool {
        if hidden && self.config.purge_on_hide {
            tracing::info!("View hidden; purging session");
            self.teardown().await;
            return true;
        }
        false
    }

    /// Clear the live set and release every handle and cached decode.
    #[tracing::instrument(skip(self))]
    pub async fn teardown(&self) -> usize {
        let records = self.pipeline.clear().await;

        let mut released = 0;
        for materialized in self.dispatcher.clear() {
            if let Some(handle) = &materialized.handle {
                if self.guard.release(handle) {
                    released += 1;
                }
            }
        }
        for record in &records {
            if let Some(handle) = &record.resource_handle {
                if self.guard.release(handle) {
                    released += 1;
                }
            }
        }
        released += self.guard.release_all(&HashSet::new());

        tracing::info!(records = records.len(), released, "Session torn down");
        released
    }

    /// Run one leak sweep against the current live set.
    ///
    /// If live handles still pin more than the retained budget afterwards,
    /// the whole session is torn down.
    pub async fn sweep(&self) -> usize {
        let live_ids = self.pipeline.live_ids().await;
        let revoked = self.guard.sweep(&live_ids);

        let retained = self.guard.retained_bytes();
        if retained <= self.config.retained_budget_bytes {
            return revoked;
        }

        tracing::warn!(
            retained,
            budget = self.config.retained_budget_bytes,
            "Retained memory over budget; purging session"
        );
        revoked + self.teardown().await
    }

    /// Start the periodic sweep. The task stops once the session is dropped.
    pub fn start_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let session: Weak<Self> = Arc::downgrade(self);
        let period = self.config.sweep_interval;

        tokio::spawn(async move {
            let mut sweep_interval = interval(period);
            // The first tick completes immediately.
            sweep_interval.tick().await;

            loop {
                sweep_interval.tick().await;

                let Some(session) = session.upgrade() else {
                    tracing::debug!("Session dropped; stopping sweeper");
                    break;
                };
                session.sweep().await;
            }
        })
    }

    fn release_record(&self, record: &MediaRecord) {
        let mut handles: Vec<ResourceHandle> = Vec::new();
        if let Some(materialized) = self.dispatcher.forget(&record.id) {
            handles.extend(materialized.handle.clone());
        }
        handles.extend(record.resource_handle.clone());

        for handle in &handles {
            self.guard.release(handle);
        }
        self.guard.release_owner(record.id);

        tracing::debug!(media.id = %record.id, name = %record.name, "Released record");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use omniview_core::models::{LocalFile, RenderedContent};
    use omniview_processing::traits::{
        HandleIssuer, NetworkFetch, PdfRenderer, PdfSource, PdfView, ProbeResponse,
    };

    struct OfflineFetch;

    #[async_trait]
    impl NetworkFetch for OfflineFetch {
        async fn head(&self, _url: &str) -> anyhow::Result<ProbeResponse> {
            Err(anyhow::anyhow!("offline"))
        }

        async fn get(&self, _url: &str, _max_bytes: u64) -> anyhow::Result<Bytes> {
            Err(anyhow::anyhow!("offline"))
        }
    }

    fn session(config: ViewerConfig) -> (Arc<ViewerSession>, Arc<ObjectUrlRegistry>) {
        let handles = Arc::new(ObjectUrlRegistry::new());
        let collaborators =
            Collaborators::with_defaults(Arc::new(OfflineFetch), handles.clone()).unwrap();
        (
            Arc::new(ViewerSession::new(config, collaborators).unwrap()),
            handles,
        )
    }

    fn video(name: &str) -> IngestInput {
        IngestInput::Local(LocalFile::new(name, "video/mp4", Bytes::from_static(b"\0\0\0 ftyp")))
    }

    #[tokio::test]
    async fn test_materialize_tracks_handle_once() {
        let (session, registry) = session(ViewerConfig::default());
        let id = session.ingest(vec![video("clip.mp4")]).await.records[0].id;

        let first = session.materialize(id).await.unwrap();
        let second = session.materialize(id).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.live_count(), 1);
        assert_eq!(session.guard().tracked_count(), 1);

        let record = session.get(id).await.unwrap();
        assert!(record.materialized);
        assert_eq!(record.resource_handle, first.handle);
    }

    #[tokio::test]
    async fn test_remove_releases_handle() {
        let (session, registry) = session(ViewerConfig::default());
        let id = session.ingest(vec![video("clip.mp4")]).await.records[0].id;
        let handle = session.materialize(id).await.unwrap().handle.clone().unwrap();

        session.remove(id).await.unwrap();
        assert!(!registry.is_live(&handle));
        assert!(!session.guard().release(&handle));
        assert!(matches!(
            session.materialize(id).await,
            Err(ViewerError::RecordNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_teardown_releases_everything() {
        let (session, registry) = session(ViewerConfig::default());
        let report = session.ingest(vec![video("a.mp4"), video("b.mp4")]).await;
        for record in &report.records {
            session.materialize(record.id).await.unwrap();
        }
        assert_eq!(registry.live_count(), 2);

        session.teardown().await;
        assert_eq!(registry.live_count(), 0);
        assert!(session.is_empty().await);
    }

    #[tokio::test]
    async fn test_visibility_purge_respects_config() {
        let config = ViewerConfig {
            purge_on_hide: false,
            ..ViewerConfig::default()
        };
        let (session_kept, _) = session(config);
        session_kept.ingest(vec![video("a.mp4")]).await;
        assert!(!session_kept.on_visibility_change(true).await);
        assert_eq!(session_kept.len().await, 1);

        let (session_purged, _) = session(ViewerConfig::default());
        session_purged.ingest(vec![video("a.mp4")]).await;
        assert!(!session_purged.on_visibility_change(false).await);
        assert!(session_purged.on_visibility_change(true).await);
        assert!(session_purged.is_empty().await);
    }

    #[tokio::test]
    async fn test_storage_locked_on_start() {
        let (session, _) = session(ViewerConfig::default());
        assert!(session.guard().storage().is_locked());

        let config = ViewerConfig {
            lock_storage: false,
            ..ViewerConfig::default()
        };
        let (unlocked, _) = self::session(config);
        assert!(!unlocked.guard().storage().is_locked());
    }

    #[tokio::test]
    async fn test_prune_releases_pruned_handles() {
        let (session, registry) = session(ViewerConfig::default());
        let report = session
            .ingest((0..4).map(|i| video(&format!("{}.mp4", i))).collect())
            .await;
        for record in &report.records {
            session.materialize(record.id).await.unwrap();
        }

        assert_eq!(session.prune_to_recent(1).await, 3);
        assert_eq!(registry.live_count(), 1);
    }

    #[tokio::test]
    async fn test_sweep_revokes_leaked_handle() {
        let config = ViewerConfig {
            sweep_interval: Duration::from_millis(20),
            ..ViewerConfig::default()
        };
        let (session, registry) = session(config);
        let leaked = registry.issue(Bytes::from_static(b"leak"), "video/mp4");

        let sweeper = session.start_sweeper();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!registry.is_live(&leaked));

        drop(session);
        tokio::time::timeout(Duration::from_secs(1), sweeper)
            .await
            .unwrap()
            .unwrap();
    }

    /// Renders local PDFs through the registry, but only after a delay.
    struct SlowPdfRenderer {
        handles: Arc<ObjectUrlRegistry>,
        delay: Duration,
    }

    #[async_trait]
    impl PdfRenderer for SlowPdfRenderer {
        async fn render_first_page(&self, source: PdfSource) -> anyhow::Result<PdfView> {
            tokio::time::sleep(self.delay).await;
            let PdfSource::Bytes(data) = source else {
                return Err(anyhow::anyhow!("expected local bytes"));
            };
            let handle = self.handles.issue(data, "application/pdf");
            Ok(PdfView {
                src: handle.to_string(),
                page_count: Some(1),
                handle: Some(handle),
            })
        }
    }

    #[tokio::test]
    async fn test_remove_during_materialize_discards_result() {
        let handles = Arc::new(ObjectUrlRegistry::new());
        let mut collaborators =
            Collaborators::with_defaults(Arc::new(OfflineFetch), handles.clone()).unwrap();
        collaborators.pdf = Arc::new(SlowPdfRenderer {
            handles: handles.clone(),
            delay: Duration::from_millis(100),
        });
        let session =
            Arc::new(ViewerSession::new(ViewerConfig::default(), collaborators).unwrap());

        let id = session
            .ingest(vec![IngestInput::Local(LocalFile::new(
                "report.pdf",
                "application/pdf",
                Bytes::from_static(b"%PDF-1.7 /Count 1"),
            ))])
            .await
            .records[0]
            .id;

        let pending = tokio::spawn({
            let session = session.clone();
            async move { session.materialize(id).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.remove(id).await.unwrap();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(ViewerError::RecordNotFound(found)) if found == id));
        assert_eq!(handles.live_count(), 0);
        assert_eq!(session.guard().tracked_count(), 0);
        assert!(session.dispatcher.cached(&id).is_none());
    }

    #[tokio::test]
    async fn test_sweep_purges_when_over_retained_budget() {
        let config = ViewerConfig {
            retained_budget_bytes: 16,
            ..ViewerConfig::default()
        };
        let (session, registry) = session(config);
        let id = session
            .ingest(vec![IngestInput::Local(LocalFile::new(
                "big.mp4",
                "video/mp4",
                Bytes::from(vec![0u8; 64]),
            ))])
            .await
            .records[0]
            .id;
        session.materialize(id).await.unwrap();
        assert_eq!(session.guard().retained_bytes(), 64);

        assert_eq!(session.sweep().await, 1);
        assert_eq!(registry.live_count(), 0);
        assert!(session.is_empty().await);
    }

    #[tokio::test]
    async fn test_sweep_within_budget_keeps_live_records() {
        let (session, registry) = session(ViewerConfig::default());
        let id = session.ingest(vec![video("clip.mp4")]).await.records[0].id;
        session.materialize(id).await.unwrap();

        assert_eq!(session.sweep().await, 0);
        assert_eq!(registry.live_count(), 1);
        assert_eq!(session.len().await, 1);
    }

    #[tokio::test]
    async fn test_remote_fetch_failure_renders_error() {
        let (session, _) = session(ViewerConfig::default());
        let record = session
            .ingest_single_url("https://example.com/notes.txt")
            .await
            .unwrap();

        let materialized = session.materialize(record.id).await.unwrap();
        assert!(matches!(
            materialized.content,
            RenderedContent::Error { ref code, .. } if code == "NETWORK_ERROR"
        ));
    }
}
