//! Resource handle lifetime tracking and the periodic leak sweep.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use omniview_core::models::{MediaId, ResourceHandle};
use omniview_processing::traits::HandleIssuer;
use parking_lot::Mutex;

use crate::storage_lock::StorageLock;

/// Tracks which record owns each issued handle and revokes handles whose
/// owner has left the live set.
pub struct LifetimeGuard {
    issuer: Arc<dyn HandleIssuer>,
    tracked: Mutex<HashMap<ResourceHandle, MediaId>>,
    /// Untracked handles younger than this are assumed to be mid-materialization
    grace: Duration,
    storage: StorageLock,
}

impl LifetimeGuard {
    pub fn new(issuer: Arc<dyn HandleIssuer>, grace: Duration, storage: StorageLock) -> Self {
        Self {
            issuer,
            tracked: Mutex::new(HashMap::new()),
            grace,
            storage,
        }
    }

    pub fn track(&self, owner: MediaId, handle: ResourceHandle) {
        tracing::debug!(media.id = %owner, handle = %handle, "Tracking handle");
        self.tracked.lock().insert(handle, owner);
    }

    /// Revoke a handle. Safe to call repeatedly; returns whether this call revoked it.
    pub fn release(&self, handle: &ResourceHandle) -> bool {
        self.tracked.lock().remove(handle);
        self.issuer.revoke(handle)
    }

    /// Revoke every handle owned by `owner`.
    pub fn release_owner(&self, owner: MediaId) -> usize {
        let handles: Vec<ResourceHandle> = {
            let mut tracked = self.tracked.lock();
            let owned: Vec<_> = tracked
                .iter()
                .filter(|(_, id)| **id == owner)
                .map(|(handle, _)| handle.clone())
                .collect();
            for handle in &owned {
                tracked.remove(handle);
            }
            owned
        };

        handles
            .iter()
            .filter(|handle| self.issuer.revoke(handle))
            .count()
    }

    /// Revoke and forget every tracked handle whose owner is not in `live_ids`.
    #[tracing::instrument(skip_all, fields(live = live_ids.len()))]
    pub fn release_all(&self, live_ids: &HashSet<MediaId>) -> usize {
        let orphaned: Vec<ResourceHandle> = {
            let mut tracked = self.tracked.lock();
            let orphaned: Vec<_> = tracked
                .iter()
                .filter(|(_, owner)| !live_ids.contains(owner))
                .map(|(handle, _)| handle.clone())
                .collect();
            for handle in &orphaned {
                tracked.remove(handle);
            }
            orphaned
        };

        let released = orphaned
            .iter()
            .filter(|handle| self.issuer.revoke(handle))
            .count();
        if released > 0 {
            tracing::info!(released, "Released orphaned handles");
        }
        released
    }

    /// Revoke live handles not referenced by any live record.
    ///
    /// Untracked handles issued within the grace period are skipped.
    pub fn sweep(&self, live_ids: &HashSet<MediaId>) -> usize {
        let mut revoked = 0;

        for issued in self.issuer.live_handles() {
            let owner = self.tracked.lock().get(&issued.handle).copied();
            let keep = match owner {
                Some(owner) => live_ids.contains(&owner),
                None => issued.issued_at.elapsed() < self.grace,
            };
            if keep {
                continue;
            }

            self.tracked.lock().remove(&issued.handle);
            if self.issuer.revoke(&issued.handle) {
                tracing::debug!(handle = %issued.handle, size = issued.size_bytes, "Swept leaked handle");
                revoked += 1;
            }
        }

        if revoked > 0 {
            tracing::info!(revoked, "Sweep revoked leaked handles");
        }
        revoked
    }

    /// Bytes pinned by every live handle, tracked or not.
    pub fn retained_bytes(&self) -> u64 {
        self.issuer.retained_bytes()
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.lock().len()
    }

    pub fn is_live(&self, handle: &ResourceHandle) -> bool {
        self.issuer.is_live(handle)
    }

    /// Clear and lock persistent storage for the rest of the session.
    pub fn lock_storage(&self) -> bool {
        self.storage.lock()
    }

    pub fn storage(&self) -> &StorageLock {
        &self.storage
    }
}
