//! Persistent-storage lockout.
//!
//! Once locked, writes fail loudly with [`ViewerError::StorageWriteBlocked`],
//! reads come back empty and remove/clear do nothing.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use omniview_core::error::{ViewerError, ViewerResult};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    Local,
    Session,
    IndexedDb,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Local => "localStorage",
            StorageKind::Session => "sessionStorage",
            StorageKind::IndexedDb => "indexedDB",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key-value persistence backend.
pub trait PersistentStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
    fn clear(&self);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistentStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries.lock().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// One backend behind the shared lock flag.
#[derive(Clone)]
pub struct GuardedStorage {
    kind: StorageKind,
    inner: Arc<dyn PersistentStore>,
    locked: Arc<AtomicBool>,
}

impl GuardedStorage {
    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if self.locked.load(Ordering::Acquire) {
            return None;
        }
        self.inner.get(key)
    }

    pub fn set(&self, key: &str, value: impl Into<String>) -> ViewerResult<()> {
        if self.locked.load(Ordering::Acquire) {
            tracing::warn!(backend = %self.kind, key, "Blocked persistent storage write");
            return Err(ViewerError::StorageWriteBlocked {
                backend: self.kind.to_string(),
                key: key.to_string(),
            });
        }
        self.inner.set(key, value.into());
        Ok(())
    }

    pub fn remove(&self, key: &str) {
        if !self.locked.load(Ordering::Acquire) {
            self.inner.remove(key);
        }
    }

    pub fn clear(&self) {
        if !self.locked.load(Ordering::Acquire) {
            self.inner.clear();
        }
    }
}

/// The three persistent backends plus the session-wide lock.
pub struct StorageLock {
    locked: Arc<AtomicBool>,
    local: GuardedStorage,
    session: GuardedStorage,
    indexed_db: GuardedStorage,
}

impl StorageLock {
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
        )
    }

    pub fn new(
        local: Arc<dyn PersistentStore>,
        session: Arc<dyn PersistentStore>,
        indexed_db: Arc<dyn PersistentStore>,
    ) -> Self {
        let locked = Arc::new(AtomicBool::new(false));
        let guard = |kind, inner| GuardedStorage {
            kind,
            inner,
            locked: locked.clone(),
        };

        Self {
            local: guard(StorageKind::Local, local),
            session: guard(StorageKind::Session, session),
            indexed_db: guard(StorageKind::IndexedDb, indexed_db),
            locked: locked.clone(),
        }
    }

    /// Clear every backend, then block writes. Only the first call does anything.
    pub fn lock(&self) -> bool {
        if self.locked.load(Ordering::Acquire) {
            return false;
        }

        for backend in self.backends() {
            backend.inner.clear();
        }

        let newly_locked = self
            .locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if newly_locked {
            tracing::info!("Persistent storage cleared and locked");
        }
        newly_locked
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    pub fn backend(&self, kind: StorageKind) -> &GuardedStorage {
        match kind {
            StorageKind::Local => &self.local,
            StorageKind::Session => &self.session,
            StorageKind::IndexedDb => &self.indexed_db,
        }
    }

    fn backends(&self) -> [&GuardedStorage; 3] {
        [&self.local, &self.session, &self.indexed_db]
    }
}

impl Default for StorageLock {
    fn default() -> Self {
        Self::in_memory()
    }
}
