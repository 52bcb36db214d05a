/// Append-only log of node deletions for delta sync.
///
/// Sync clients that reconnect after a gap need to learn about tombstones:
/// nodes that existed at their last `since` but have been removed. Every
/// successful delete appends one entry here, and `GET /_sync` serves the
/// entries newer than the client's cursor.
///
/// Entries are retained for the process lifetime by default. A bounded ring
/// can be configured for long-lived deployments; when the cap is reached the
/// oldest entries are dropped, which is safe once every client has synced
/// past them.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::RwLock;

/// A single tombstone record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionEntry {
    /// Id of the deleted node.
    pub node_id: String,
    /// Content type of the deleted node.
    pub node_type: String,
    /// Plugin that owned the node.
    pub owner: String,
    /// When the deletion happened.
    pub deleted_at: DateTime<Utc>,
}

/// Append-only ring of deletion entries.
#[derive(Debug)]
pub struct DeletionLog {
    entries: RwLock<VecDeque<DeletionEntry>>,
    /// Maximum retained entries; `None` keeps everything.
    max_entries: Option<usize>,
}

impl Default for DeletionLog {
    fn default() -> Self {
        Self::new()
    }
}

impl DeletionLog {
    /// Create an unbounded log (entries retained for the process lifetime).
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            max_entries: None,
        }
    }

    /// Create a bounded ring that drops the oldest entries past `max`.
    pub fn with_capacity(max: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(max)),
            max_entries: Some(max),
        }
    }

    /// Record a deletion.
    pub fn append(&self, entry: DeletionEntry) {
        let mut entries = self.entries.write().expect("deletion log poisoned");
        if let Some(max) = self.max_entries {
            while entries.len() >= max {
                entries.pop_front();
            }
        }
        entries.push_back(entry);
    }

    /// Entries strictly newer than `since`, optionally filtered by type.
    ///
    /// An empty `types` filter means all types.
    pub fn entries_since(&self, since: DateTime<Utc>, types: &[String]) -> Vec<DeletionEntry> {
        let entries = self.entries.read().expect("deletion log poisoned");
        entries
            .iter()
            .filter(|e| e.deleted_at > since)
            .filter(|e| types.is_empty() || types.iter().any(|t| t == &e.node_type))
            .cloned()
            .collect()
    }

    /// Entries in the half-open window `(since, until]`, optionally filtered
    /// by type. Used when a truncated sync response must not leak tombstones
    /// past its reported `serverTime`.
    pub fn entries_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        types: &[String],
    ) -> Vec<DeletionEntry> {
        self.entries_since(since, types)
            .into_iter()
            .filter(|e| e.deleted_at <= until)
            .collect()
    }

    /// Total retained entries.
    pub fn len(&self) -> usize {
        self.entries.read().expect("deletion log poisoned").len()
    }

    /// Whether the log holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Used by tests and `Runtime::reset`.
    pub fn clear(&self) {
        self.entries.write().expect("deletion log poisoned").clear();
    }
}
