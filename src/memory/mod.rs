pub mod persist;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

use crate::relevance::{keywords, overlap_score};
use crate::types::{MemoryItem, Role};

/// Default number of items kept before the oldest are evicted.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Append-only conversation log with naive keyword retrieval.
///
/// The log is capped: once `capacity` is exceeded the oldest items are
/// dropped first. Access is serialized through an internal mutex so the
/// store can be shared across concurrent requests behind an `Arc`.
///
/// When built with [`MemoryStore::with_backing`], the log is loaded from a
/// JSON file and rewritten after appends. Inside a tokio runtime the write
/// runs on the blocking pool, and appends that land while a write is still
/// queued share it. Disk failures are logged and otherwise ignored.
pub struct MemoryStore {
    items: Arc<Mutex<VecDeque<MemoryItem>>>,
    capacity: usize,
    backing: Option<PathBuf>,
    /// Held while writing the backing file so snapshots land in order.
    persist_lock: Arc<Mutex<()>>,
    /// Set while a write is queued but has not taken its snapshot yet.
    write_pending: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
            backing: None,
            persist_lock: Arc::new(Mutex::new(())),
            write_pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a store mirrored to `path`, seeded with whatever the file holds.
    ///
    /// A file that cannot be read is renamed to `<name>.bak` before anything
    /// is written. If even that fails the store runs in memory only.
    pub fn with_backing(capacity: usize, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut store = Self::new(capacity);

        match persist::load(&path) {
            Ok(items) => {
                let loaded = items.len();
                let mut log = store.lock();
                log.extend(items);
                while log.len() > store.capacity {
                    log.pop_front();
                }
                drop(log);
                info!(path = %path.display(), loaded, "loaded memory log");
            }
            Err(e) => {
                warn!(path = %path.display(), "unreadable memory log: {e}");
                match persist::set_aside(&path) {
                    Ok(backup) => {
                        warn!(backup = %backup.display(), "moved unreadable memory log aside")
                    }
                    Err(e) => {
                        error!("{e}; memory will not be persisted");
                        return store;
                    }
                }
            }
        }

        store.backing = Some(path);
        store
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<MemoryItem>> {
        lock_items(&self.items)
    }

    /// Record a message and evict the oldest items past capacity.
    pub fn append(&self, role: Role, text: impl Into<String>) -> MemoryItem {
        let item = MemoryItem::new(role, text);
        {
            let mut log = self.lock();
            log.push_back(item.clone());
            while log.len() > self.capacity {
                log.pop_front();
            }
        }
        debug!(role = %item.role, chars = item.text.len(), "memory appended");
        self.persist();
        item
    }

    fn persist(&self) {
        let Some(path) = self.backing.clone() else {
            return;
        };
        // The queued write has not snapshotted yet, so it will include this change.
        if self.write_pending.swap(true, Ordering::AcqRel) {
            return;
        }

        let items = Arc::clone(&self.items);
        let persist_lock = Arc::clone(&self.persist_lock);
        let pending = Arc::clone(&self.write_pending);
        let write = move || write_snapshot(&path, &items, &persist_lock, &pending);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(write);
            }
            Err(_) => write(),
        }
    }

    /// Items most relevant to `query`, best first.
    ///
    /// An empty query returns the most recent `limit` items in log order.
    /// Otherwise items are scored by keyword overlap with the query and
    /// the top `limit` with a non-zero score are returned; ties keep log
    /// order. If nothing overlaps, falls back to the most recent items.
    pub fn retrieve_relevant(&self, query: &str, limit: usize) -> Vec<MemoryItem> {
        if query.is_empty() {
            return self.recent(limit);
        }

        let query_words = keywords(query);
        let log = self.lock();

        let mut scored: Vec<(usize, &MemoryItem)> = log
            .iter()
            .map(|item| (overlap_score(&query_words, &keywords(&item.text)), item))
            .filter(|(score, _)| *score > 0)
            .collect();

        if scored.is_empty() {
            drop(log);
            return self.recent(limit);
        }

        // sort_by is stable: equal scores stay in log order
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(limit)
            .map(|(_, item)| item.clone())
            .collect()
    }

    /// The last `limit` items in log order.
    pub fn recent(&self, limit: usize) -> Vec<MemoryItem> {
        let log = self.lock();
        let skip = log.len().saturating_sub(limit);
        log.iter().skip(skip).cloned().collect()
    }

    /// Copy of the whole log, oldest first.
    pub fn snapshot(&self) -> Vec<MemoryItem> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.lock().clear();
        self.persist();
    }
}

// A panic while holding the lock cannot leave the deque half-updated,
// so a poisoned guard is still usable.
fn lock_items(items: &Mutex<VecDeque<MemoryItem>>) -> MutexGuard<'_, VecDeque<MemoryItem>> {
    items.lock().unwrap_or_else(|e| e.into_inner())
}

fn write_snapshot(
    path: &Path,
    items: &Mutex<VecDeque<MemoryItem>>,
    persist_lock: &Mutex<()>,
    pending: &AtomicBool,
) {
    let _guard = persist_lock.lock().unwrap_or_else(|e| e.into_inner());
    pending.store(false, Ordering::Release);
    let snapshot: Vec<MemoryItem> = lock_items(items).iter().cloned().collect();
    if let Err(e) = persist::save(path, &snapshot) {
        warn!(path = %path.display(), "failed to persist memory: {e}");
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
