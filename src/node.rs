/// Core node types for the universal data layer.
///
/// A [`Node`] is the canonical unit of content: a uniquely identified record
/// with a content type, an owning plugin, arbitrary user-visible fields, and
/// an optional place in a parent/child hierarchy. Nodes are content-addressed:
/// the immutable descriptor carries a hex SHA-256 digest over the node's
/// user-visible fields, so two nodes with byte-equivalent canonical content
/// always share a digest.
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use sha2::{Digest, Sha256};

/// The immutable descriptor attached to every node.
///
/// `created_at` and `modified_at` are milliseconds since the Unix epoch.
/// `created_at` is preserved across re-creates of the same id; `modified_at`
/// advances monotonically per id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInternal {
    /// Globally unique node id.
    pub id: String,
    /// The content type (e.g. "Product", "Collection").
    #[serde(rename = "type")]
    pub node_type: String,
    /// The plugin that produced this node.
    pub owner: String,
    /// Hex SHA-256 over the node's user-visible fields.
    pub content_digest: String,
    /// Creation instant, ms since epoch.
    pub created_at: i64,
    /// Last mutation instant, ms since epoch.
    pub modified_at: i64,
}

/// A node in the content graph.
///
/// User-visible fields are held as a JSON object map. `serde_json`'s map is
/// key-ordered, which makes the serialized form canonical and keeps content
/// digests stable (see [`content_digest`]).
///
/// `children` is derived state maintained by the actions layer; callers never
/// write it directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// The immutable descriptor.
    pub internal: NodeInternal,
    /// Optional id of a parent node (one-to-many hierarchy).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Ordered set of child ids, maintained automatically.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    /// Arbitrary user-visible fields.
    #[serde(flatten)]
    pub fields: Map<String, JsonValue>,
}

impl Node {
    /// Current instant in milliseconds since the Unix epoch.
    pub fn now_millis() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// Read a user-visible field by name.
    pub fn field(&self, name: &str) -> Option<&JsonValue> {
        self.fields.get(name)
    }

    /// Append a child id if it is not already present.
    ///
    /// Re-adding an existing child never duplicates the id.
    pub fn add_child(&mut self, child_id: &str) {
        if !self.children.iter().any(|c| c == child_id) {
            self.children.push(child_id.to_string());
        }
    }

    /// Remove a child id if present.
    pub fn remove_child(&mut self, child_id: &str) {
        self.children.retain(|c| c != child_id);
    }

    /// Recompute and store this node's content digest.
    pub fn refresh_digest(&mut self) {
        self.internal.content_digest = content_digest(self);
    }
}

/// Names that are part of the node envelope rather than user content.
///
/// Excluded from schema inference and protected from `extend_node` patches.
pub const RESERVED_FIELDS: &[&str] = &["internal", "parent", "children"];

/// Compute the hex SHA-256 content digest for a node.
///
/// The digest covers a canonical serialization of the node excluding
/// `created_at`, `modified_at`, `content_digest`, and `children`. The id,
/// type, owner, parent, and all user-visible fields participate, so any
/// observable content change produces a new digest while bookkeeping
/// updates do not.
pub fn content_digest(node: &Node) -> String {
    let mut doc = Map::new();
    let mut internal = Map::new();
    internal.insert("id".into(), JsonValue::String(node.internal.id.clone()));
    internal.insert(
        "type".into(),
        JsonValue::String(node.internal.node_type.clone()),
    );
    internal.insert(
        "owner".into(),
        JsonValue::String(node.internal.owner.clone()),
    );
    doc.insert("internal".into(), JsonValue::Object(internal));
    if let Some(parent) = &node.parent {
        doc.insert("parent".into(), JsonValue::String(parent.clone()));
    }
    for (key, value) in &node.fields {
        doc.insert(key.clone(), value.clone());
    }
    digest_json(&JsonValue::Object(doc))
}

/// Hex SHA-256 over a JSON value's canonical serialization.
///
/// `serde_json` maps iterate in key order, so `to_string` is already a
/// stable canonical form for any object tree.
pub fn digest_json(value: &JsonValue) -> String {
    let canonical = value.to_string();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}
