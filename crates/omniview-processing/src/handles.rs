//! In-memory object URL registry.

use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;
use omniview_core::constants::OBJECT_URL_PREFIX;
use omniview_core::models::ResourceHandle;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::traits::{HandleIssuer, IssuedHandle};

struct ObjectUrlEntry {
    data: Bytes,
    mime_type: String,
    issued_at: Instant,
}

/// Keeps the bytes behind every issued `blob:` URL until it is revoked.
#[derive(Default)]
pub struct ObjectUrlRegistry {
    entries: Mutex<HashMap<ResourceHandle, ObjectUrlEntry>>,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes and MIME type behind a live handle.
    pub fn resolve(&self, handle: &ResourceHandle) -> Option<(Bytes, String)> {
        self.entries
            .lock()
            .get(handle)
            .map(|entry| (entry.data.clone(), entry.mime_type.clone()))
    }

    pub fn live_count(&self) -> usize {
        self.entries.lock().len()
    }
}

impl HandleIssuer for ObjectUrlRegistry {
    fn issue(&self, data: Bytes, mime_type: &str) -> ResourceHandle {
        let handle = ResourceHandle::new(format!("{}{}", OBJECT_URL_PREFIX, Uuid::new_v4()));
        tracing::debug!(handle = %handle, size = data.len(), "Issued object URL");
        self.entries.lock().insert(
            handle.clone(),
            ObjectUrlEntry {
                data,
                mime_type: mime_type.to_string(),
                issued_at: Instant::now(),
            },
        );
        handle
    }

    fn revoke(&self, handle: &ResourceHandle) -> bool {
        let removed = self.entries.lock().remove(handle).is_some();
        if removed {
            tracing::debug!(handle = %handle, "Revoked object URL");
        }
        removed
    }

    fn is_live(&self, handle: &ResourceHandle) -> bool {
        self.entries.lock().contains_key(handle)
    }

    fn retained_bytes(&self) -> u64 {
        self.entries
            .lock()
            .values()
            .map(|entry| entry.data.len() as u64)
            .sum()
    }

    fn live_handles(&self) -> Vec<IssuedHandle> {
        self.entries
            .lock()
            .iter()
            .map(|(handle, entry)| IssuedHandle {
                handle: handle.clone(),
                size_bytes: entry.data.len() as u64,
                issued_at: entry.issued_at,
            })
            .collect()
    }
}
