//! Ingestion of dropped files and pasted URLs into the bounded live set.

use std::collections::HashSet;
use std::fmt;

use futures::stream::{self, StreamExt};
use omniview_core::constants::DEFAULT_MAX_FILE_MB;
use omniview_core::error::{ErrorMetadata, LogLevel, ViewerError, ViewerResult};
use omniview_core::models::{LocalFile, MediaId, MediaRecord, ResourceHandle};
use omniview_processing::classifier::{classify, expected_content_type};
use tokio::sync::RwLock;

use crate::resolver::RemoteResourceResolver;

/// One item handed to [`IngestionPipeline::ingest`].
#[derive(Debug, Clone)]
pub enum IngestInput {
    Local(LocalFile),
    Url(String),
}

impl IngestInput {
    pub fn url(raw: impl Into<String>) -> Self {
        Self::Url(raw.into())
    }
}

impl fmt::Display for IngestInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestInput::Local(file) => f.write_str(&file.name),
            IngestInput::Url(url) => f.write_str(url),
        }
    }
}

/// An input that was skipped because it could not be resolved.
#[derive(Debug, Clone)]
pub struct IngestFailure {
    /// Position in the submitted batch
    pub index: usize,
    pub input: String,
    pub error: ViewerError,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    /// Accepted records, in input order
    pub records: Vec<MediaRecord>,
    /// Inputs refused because the live set was full
    pub dropped: usize,
    pub failures: Vec<IngestFailure>,
    /// Non-blocking notices (probe failures, capacity)
    pub notices: Vec<ViewerError>,
}

/// Owner of the ordered live set.
///
/// The set is only ever replaced wholesale under the write lock, so readers
/// never observe a half-applied batch.
pub struct IngestionPipeline {
    resolver: RemoteResourceResolver,
    live: RwLock<Vec<MediaRecord>>,
    max_records: usize,
    max_file_bytes: u64,
    concurrency: usize,
}

impl IngestionPipeline {
    pub fn new(resolver: RemoteResourceResolver, max_records: usize, concurrency: usize) -> Self {
        Self {
            resolver,
            live: RwLock::new(Vec::new()),
            max_records,
            max_file_bytes: DEFAULT_MAX_FILE_MB * 1024 * 1024,
            concurrency: concurrency.max(1),
        }
    }

    /// Reject local files larger than `max_file_bytes`.
    pub fn with_max_file_bytes(mut self, max_file_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// Ingest a batch.
    ///
    /// URLs resolve concurrently; results are committed in input order once
    /// all have settled. Inputs arriving after the cap is reached are dropped.
    #[tracing::instrument(skip(self, inputs), fields(ingest.batch_size = inputs.len()))]
    pub async fn ingest(&self, inputs: Vec<IngestInput>) -> IngestReport {
        let resolver = &self.resolver;
        let max_file_bytes = self.max_file_bytes;
        let resolved: Vec<(String, ViewerResult<(MediaRecord, Option<ViewerError>)>)> =
            stream::iter(inputs.into_iter().map(|input| async move {
                let label = input.to_string();
                let outcome = match input {
                    IngestInput::Local(file) if file.size() > max_file_bytes => {
                        Err(ViewerError::FileTooLarge {
                            size: file.size(),
                            name: file.name,
                            limit: max_file_bytes,
                        })
                    }
                    IngestInput::Local(file) => Ok((record_from_local(file), None)),
                    IngestInput::Url(raw) => resolver.resolve(&raw).await.map(|resolved| {
                        let notice = resolved.notice.clone();
                        (resolved.into_record(), notice)
                    }),
                };
                (label, outcome)
            }))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut report = IngestReport::default();
        let mut live = self.live.write().await;
        let mut next = live.clone();

        for (index, (label, outcome)) in resolved.into_iter().enumerate() {
            match outcome {
                Ok((record, notice)) => {
                    if next.len() >= self.max_records {
                        report.dropped += 1;
                        continue;
                    }
                    if let Some(notice) = notice {
                        report.notices.push(notice);
                    }
                    next.push(record);
                }
                Err(error) => {
                    log_failure(&error, &label);
                    report.failures.push(IngestFailure {
                        index,
                        input: label,
                        error,
                    });
                }
            }
        }

        let accepted_from = live.len();
        renumber(&mut next);
        report.records = next[accepted_from..].to_vec();
        *live = next;

        if report.dropped > 0 {
            tracing::info!(
                limit = self.max_records,
                dropped = report.dropped,
                "Live set full; dropping remaining inputs"
            );
            report.notices.push(ViewerError::CapacityExceeded {
                limit: self.max_records,
                dropped: report.dropped,
            });
        }

        tracing::debug!(
            accepted = report.records.len(),
            failed = report.failures.len(),
            live = live.len(),
            "Batch committed"
        );

        report
    }

    /// Resolve one pasted URL and append it.
    #[tracing::instrument(skip(self))]
    pub async fn ingest_single_url(&self, raw_url: &str) -> ViewerResult<MediaRecord> {
        let resolved = self.resolver.resolve(raw_url).await?;
        if let Some(ref notice) = resolved.notice {
            tracing::info!(notice = %notice, "Accepting URL without metadata");
        }

        let mut live = self.live.write().await;
        if live.len() >= self.max_records {
            return Err(ViewerError::CapacityExceeded {
                limit: self.max_records,
                dropped: 1,
            });
        }

        let mut next = live.clone();
        let mut record = resolved.into_record();
        record.order_index = next.len();
        next.push(record.clone());
        *live = next;

        Ok(record)
    }

    /// Move the record at `from` to position `to`.
    pub async fn reorder(&self, from: usize, to: usize) -> ViewerResult<()> {
        let mut live = self.live.write().await;
        let len = live.len();
        if from >= len || to >= len {
            return Err(ViewerError::InvalidReorder { from, to, len });
        }

        let mut next = live.clone();
        let record = next.remove(from);
        next.insert(to, record);
        renumber(&mut next);
        *live = next;
        Ok(())
    }

    pub async fn remove(&self, id: MediaId) -> ViewerResult<MediaRecord> {
        let mut live = self.live.write().await;
        let position = live
            .iter()
            .position(|r| r.id == id)
            .ok_or(ViewerError::RecordNotFound(id))?;

        let mut next = live.clone();
        let removed = next.remove(position);
        renumber(&mut next);
        *live = next;
        Ok(removed)
    }

    /// Keep the `keep` most recently added records; return the rest.
    pub async fn prune_to_recent(&self, keep: usize) -> Vec<MediaRecord> {
        let mut live = self.live.write().await;
        if live.len() <= keep {
            return Vec::new();
        }

        let mut by_age: Vec<_> = live
            .iter()
            .enumerate()
            .map(|(index, r)| (r.added_at, index))
            .collect();
        by_age.sort_by(|a, b| b.cmp(a));
        let kept: HashSet<usize> = by_age.into_iter().take(keep).map(|(_, i)| i).collect();

        let (retained, pruned): (Vec<_>, Vec<_>) = live
            .iter()
            .cloned()
            .enumerate()
            .partition(|(index, _)| kept.contains(index));
        let mut next: Vec<MediaRecord> = retained.into_iter().map(|(_, r)| r).collect();
        renumber(&mut next);
        *live = next;

        tracing::debug!(pruned = pruned.len(), kept = keep, "Pruned live set");
        pruned.into_iter().map(|(_, r)| r).collect()
    }

    /// Flag a record as materialized. Returns `false` when it has left the set.
    pub async fn mark_materialized(&self, id: MediaId, handle: Option<ResourceHandle>) -> bool {
        let mut live = self.live.write().await;
        let Some(position) = live.iter().position(|r| r.id == id) else {
            return false;
        };

        let current = &live[position];
        if current.materialized && (handle.is_none() || current.resource_handle == handle) {
            return true;
        }

        let mut next = live.clone();
        let record = &mut next[position];
        record.materialized = true;
        if handle.is_some() {
            record.resource_handle = handle;
        }
        *live = next;
        true
    }

    /// Empty the live set and return what it held.
    pub async fn clear(&self) -> Vec<MediaRecord> {
        let mut live = self.live.write().await;
        std::mem::take(&mut *live)
    }

    pub async fn get(&self, id: MediaId) -> Option<MediaRecord> {
        self.live.read().await.iter().find(|r| r.id == id).cloned()
    }

    pub async fn snapshot(&self) -> Vec<MediaRecord> {
        self.live.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.live.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.live.read().await.is_empty()
    }

    pub async fn live_ids(&self) -> HashSet<MediaId> {
        self.live.read().await.iter().map(|r| r.id).collect()
    }
}

fn record_from_local(mut file: LocalFile) -> MediaRecord {
    let classification = classify(&file.name, &file.mime_type);
    if file.mime_type.trim().is_empty() {
        if let Some(content_type) = classification
            .extension
            .as_deref()
            .and_then(expected_content_type)
        {
            file.mime_type = content_type.to_string();
        }
    }
    MediaRecord::from_local(file, classification)
}

fn log_failure(error: &ViewerError, input: &str) {
    let code = error.error_code();
    match error.log_level() {
        LogLevel::Debug => tracing::debug!(error = %error, code, input, "Skipping input"),
        LogLevel::Warn => tracing::warn!(error = %error, code, input, "Skipping input"),
        LogLevel::Error => tracing::error!(error = %error, code, input, "Skipping input"),
    }
}

fn renumber(records: &mut [MediaRecord]) {
    for (index, record) in records.iter_mut().enumerate() {
        record.order_index = index;
    }
}
