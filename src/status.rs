use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use serde::{Deserialize, Serialize};

/// How a single file's transfer settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    Completed,
    Failed,
}

/// Per-folder aggregate upload state.
///
/// A dispatched file name lives in exactly one of the three sets. It moves
/// out of `pending` once, on first settlement, and never moves again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadStatus {
    pub folder_name: String,
    pub pending: BTreeSet<String>,
    pub completed: BTreeSet<String>,
    pub failed: BTreeSet<String>,
}

impl UploadStatus {
    /// True once every dispatched file has settled.
    pub fn is_drained(&self) -> bool {
        self.pending.is_empty()
    }

    /// True when there is anything to report for a drained folder.
    pub fn has_outcome(&self) -> bool {
        !self.completed.is_empty() || !self.failed.is_empty()
    }
}

/// Mapping from folder id to status snapshot.
///
/// Entries are replaced wholesale on every mutation so snapshots handed to
/// subscribers never observe a partially applied update.
#[derive(Debug, Default)]
pub struct StatusStore {
    entries: HashMap<String, Arc<UploadStatus>>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, folder_id: &str) -> Option<Arc<UploadStatus>> {
        self.entries.get(folder_id).cloned()
    }

    /// Reset or override a folder's status. `None` removes the entry.
    pub fn set(&mut self, folder_id: &str, status: Option<UploadStatus>) {
        match status {
            Some(status) => {
                self.entries.insert(folder_id.to_string(), Arc::new(status));
            }
            None => {
                self.entries.remove(folder_id);
            }
        }
    }

    /// Merge a freshly admitted batch into the folder's pending set,
    /// preserving pending files from prior requests. A name being uploaded
    /// again starts a new lifecycle and leaves any previous outcome set.
    pub fn merge_pending<I>(
        &mut self,
        folder_id: &str,
        folder_name: &str,
        names: I,
    ) -> Arc<UploadStatus>
    where
        I: IntoIterator<Item = String>,
    {
        let mut next = self
            .entries
            .get(folder_id)
            .map(|status| UploadStatus::clone(status))
            .unwrap_or_default();

        next.folder_name = folder_name.to_string();
        for name in names {
            next.completed.remove(&name);
            next.failed.remove(&name);
            next.pending.insert(name);
        }

        let snapshot = Arc::new(next);
        self.entries.insert(folder_id.to_string(), snapshot.clone());
        snapshot
    }

    /// Move `file_name` out of the folder's pending set. Returns the new
    /// snapshot, or `None` when nothing changed (unknown folder, or the
    /// name already settled — first settlement is final).
    pub fn settle(
        &mut self,
        folder_id: &str,
        file_name: &str,
        outcome: SettleOutcome,
    ) -> Option<Arc<UploadStatus>> {
        let current = self.entries.get(folder_id)?;

        let mut next = UploadStatus::clone(current);
        if !next.pending.remove(file_name) {
            return None;
        }

        match outcome {
            SettleOutcome::Completed => {
                next.completed.insert(file_name.to_string());
            }
            SettleOutcome::Failed => {
                next.failed.insert(file_name.to_string());
            }
        }

        let snapshot = Arc::new(next);
        self.entries.insert(folder_id.to_string(), snapshot.clone());
        Some(snapshot)
    }
}
