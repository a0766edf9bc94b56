//! Cancellation registry: bookkeeping for in-flight calls.
//!
//! Only Pending requests live here. A request leaves the registry exactly once,
//! either through [`AbortRegistry::complete`] (Completed) or one of the abort
//! operations (Aborted). Both transitions take the same lock, so whichever
//! happens first wins and the other becomes a no-op.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::oneshot;

/// Receiver side of an abort signal. Resolves when the request is aborted.
pub type AbortSignal = oneshot::Receiver<()>;

#[derive(Debug)]
struct PendingEntry {
    api: String,
    abort_key: Option<String>,
    abort_tx: oneshot::Sender<()>,
}

#[derive(Debug, Default)]
struct Inner {
    pending: HashMap<u64, PendingEntry>,
    groups: HashMap<String, HashSet<u64>>,
}

impl Inner {
    fn remove(&mut self, sn: u64) -> Option<PendingEntry> {
        let entry = self.pending.remove(&sn)?;
        if let Some(key) = &entry.abort_key {
            if let Some(group) = self.groups.get_mut(key) {
                group.remove(&sn);
                if group.is_empty() {
                    self.groups.remove(key);
                }
            }
        }
        Some(entry)
    }
}

/// A request removed from the registry by an abort operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortedCall {
    pub sn: u64,
    pub api: String,
}

/// Point-in-time view of the registry (facts only).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub pending: usize,
    /// Pending request count per abort key.
    pub groups: HashMap<String, usize>,
}

/// Tracks Pending requests by SN and by abort key.
#[derive(Debug, Default)]
pub struct AbortRegistry {
    inner: Mutex<Inner>,
}

impl AbortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every critical section leaves the maps consistent, so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a Pending request. The returned signal fires if it gets aborted.
    ///
    /// Registering an SN that is already pending replaces the previous entry,
    /// which is then treated as aborted.
    pub fn register(&self, sn: u64, api: &str, abort_key: Option<String>) -> AbortSignal {
        let (abort_tx, abort_rx) = oneshot::channel();
        let mut inner = self.lock();
        if let Some(stale) = inner.remove(sn) {
            tracing::warn!(sn, api = stale.api.as_str(), "SN registered twice; aborting stale entry");
            let _ = stale.abort_tx.send(());
        }
        if let Some(key) = &abort_key {
            inner.groups.entry(key.clone()).or_default().insert(sn);
        }
        inner.pending.insert(
            sn,
            PendingEntry {
                api: api.to_string(),
                abort_key,
                abort_tx,
            },
        );
        abort_rx
    }

    /// Pending -> Completed. Returns `false` if the request is no longer pending,
    /// in which case its result must be discarded.
    pub fn complete(&self, sn: u64) -> bool {
        self.lock().remove(sn).is_some()
    }

    /// Pending -> Aborted. Returns `false` for unknown or already settled SNs.
    pub fn abort(&self, sn: u64) -> bool {
        let entry = self.lock().remove(sn);
        match entry {
            Some(entry) => {
                let _ = entry.abort_tx.send(());
                true
            }
            None => false,
        }
    }

    /// Abort every Pending request tagged with `key`.
    pub fn abort_by_key(&self, key: &str) -> Vec<AbortedCall> {
        let entries: Vec<(u64, PendingEntry)> = {
            let mut inner = self.lock();
            let sns: Vec<u64> = inner
                .groups
                .get(key)
                .map(|group| group.iter().copied().collect())
                .unwrap_or_default();
            sns.into_iter()
                .filter_map(|sn| inner.remove(sn).map(|e| (sn, e)))
                .collect()
        };
        Self::fire(entries)
    }

    /// Abort every Pending request.
    pub fn abort_all(&self) -> Vec<AbortedCall> {
        let entries: Vec<(u64, PendingEntry)> = {
            let mut inner = self.lock();
            inner.groups.clear();
            inner.pending.drain().collect()
        };
        Self::fire(entries)
    }

    fn fire(entries: Vec<(u64, PendingEntry)>) -> Vec<AbortedCall> {
        let mut aborted: Vec<AbortedCall> = entries
            .into_iter()
            .map(|(sn, entry)| {
                let _ = entry.abort_tx.send(());
                AbortedCall { sn, api: entry.api }
            })
            .collect();
        aborted.sort_by_key(|c| c.sn);
        aborted
    }

    pub fn is_pending(&self, sn: u64) -> bool {
        self.lock().pending.contains_key(&sn)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let inner = self.lock();
        RegistrySnapshot {
            pending: inner.pending.len(),
            groups: inner
                .groups
                .iter()
                .map(|(k, v)| (k.clone(), v.len()))
                .collect(),
        }
    }
}
