/// Durable per-source node cache.
///
/// After a plugin's `source_nodes` completes, the loader snapshots the
/// nodes that plugin owns — plus the field indexes registered for their
/// types — to `<cacheDir>/nodes.json`. On the next load the snapshot is
/// restored before `source_nodes` runs, so a source that is slow or
/// offline still serves its last known content.
///
/// The snapshot carries a crc32 checksum. A missing file, a parse failure,
/// or a checksum mismatch means the cache is ignored, never an error: the
/// plugin simply sources from scratch.
use crate::error::UdlResult;
use crate::node::Node;
use crate::store::NodeStore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Snapshot file name inside a plugin's cache directory.
pub const CACHE_FILE: &str = "nodes.json";

/// Directory name used for per-plugin caches.
pub const CACHE_DIR_NAME: &str = ".udl-cache";

#[derive(Debug, Serialize, Deserialize)]
struct CacheSnapshot {
    nodes: Vec<Node>,
    indexes: BTreeMap<String, Vec<String>>,
    checksum: String,
}

fn checksum_of(nodes: &[Node], indexes: &BTreeMap<String, Vec<String>>) -> String {
    let payload = json!({ "nodes": nodes, "indexes": indexes }).to_string();
    format!("crc32:{:08x}", crc32fast::hash(payload.as_bytes()))
}

/// Snapshot reader/writer for one plugin's cache directory.
pub struct SourceCache;

impl SourceCache {
    /// Path of the snapshot file for a cache directory.
    pub fn cache_file(cache_dir: &Path) -> PathBuf {
        cache_dir.join(CACHE_FILE)
    }

    /// Restore a snapshot into the store. Returns the number of nodes
    /// restored; 0 when there is no usable cache.
    ///
    /// Restored nodes keep their recorded timestamps and digests and go
    /// through `store.set` directly: restoration predates subscribers, so
    /// no events fire.
    pub fn restore(store: &NodeStore, cache_dir: &Path) -> usize {
        let path = Self::cache_file(cache_dir);
        let Ok(raw) = std::fs::read_to_string(&path) else {
            return 0;
        };
        let snapshot: CacheSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "ignoring unreadable cache");
                return 0;
            }
        };
        if checksum_of(&snapshot.nodes, &snapshot.indexes) != snapshot.checksum {
            warn!(file = %path.display(), "ignoring cache with bad checksum");
            return 0;
        }

        for (node_type, fields) in &snapshot.indexes {
            for field in fields {
                store.register_index(node_type, field);
            }
        }
        let count = snapshot.nodes.len();
        for node in snapshot.nodes {
            store.set(node);
        }
        debug!(file = %path.display(), nodes = count, "cache restored");
        count
    }

    /// Snapshot every node owned by `owner` (plus index registrations for
    /// their types) into the cache directory. Atomic: write-then-rename.
    pub fn write(store: &NodeStore, cache_dir: &Path, owner: &str) -> UdlResult<usize> {
        let mut nodes: Vec<Node> = store
            .get_all()
            .into_iter()
            .filter(|n| n.internal.owner == owner)
            .collect();
        nodes.sort_by(|a, b| a.internal.id.cmp(&b.internal.id));

        let mut indexes = BTreeMap::new();
        for node in &nodes {
            let node_type = &node.internal.node_type;
            if indexes.contains_key(node_type) {
                continue;
            }
            let registered = store.get_registered_indexes(node_type);
            if !registered.is_empty() {
                indexes.insert(node_type.clone(), registered);
            }
        }

        let checksum = checksum_of(&nodes, &indexes);
        let count = nodes.len();
        let snapshot = CacheSnapshot {
            nodes,
            indexes,
            checksum,
        };

        std::fs::create_dir_all(cache_dir)?;
        let path = Self::cache_file(cache_dir);
        let tmp = cache_dir.join(format!(".{CACHE_FILE}.{}.tmp", Uuid::new_v4()));
        std::fs::write(&tmp, serde_json::to_vec_pretty(&snapshot)?)?;
        std::fs::rename(&tmp, &path)?;
        debug!(file = %path.display(), nodes = count, "cache written");
        Ok(count)
    }
}
