/// Node actions: the single mutation path into the store.
///
/// `create_node`, `delete_node`, and `extend_node` enforce the graph
/// invariants the raw store does not know about: content digests, timestamp
/// bookkeeping, parent/child edge maintenance, deletion-log entries, and
/// change-event emission. Everything that writes nodes — plugins, webhook
/// handlers, the WebSocket mirror client — goes through this module.
///
/// Actions are synchronous: digest computation is cheap and the store is
/// lock-free, so the async boundary stays at the server and plugin layers.
use crate::deletion_log::{DeletionEntry, DeletionLog};
use crate::error::{UdlError, UdlResult};
use crate::events::{ChangeBus, NodeChangeEvent};
use crate::node::{content_digest, Node, NodeInternal, RESERVED_FIELDS};
use crate::store::NodeStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::debug;

/// Context threaded through every action call.
///
/// Bundles the store and change bus with the optional deletion log, an
/// optional owner override applied to created nodes, and the cascade policy
/// for deletes (on by default).
#[derive(Clone)]
pub struct ActionContext {
    /// The node store to mutate.
    pub store: Arc<NodeStore>,
    /// Bus receiving one event per successful mutation.
    pub bus: Arc<ChangeBus>,
    /// Tombstone log; deletes append here when present.
    pub deletion_log: Option<Arc<DeletionLog>>,
    /// Overrides `internal.owner` on created nodes when set.
    pub owner: Option<String>,
    /// Whether deletes recurse into children.
    pub cascade: bool,
}

impl ActionContext {
    /// Create a context over a store and bus with cascade enabled.
    pub fn new(store: Arc<NodeStore>, bus: Arc<ChangeBus>) -> Self {
        Self {
            store,
            bus,
            deletion_log: None,
            owner: None,
            cascade: true,
        }
    }

    /// Attach a deletion log.
    pub fn with_deletion_log(mut self, log: Arc<DeletionLog>) -> Self {
        self.deletion_log = Some(log);
        self
    }

    /// Override the owner recorded on created nodes.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Set the cascade policy for deletes.
    pub fn with_cascade(mut self, cascade: bool) -> Self {
        self.cascade = cascade;
        self
    }
}

/// Caller-supplied descriptor for [`create_node`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInternalInput {
    /// Globally unique node id. Required.
    #[serde(default)]
    pub id: String,
    /// Content type. Required.
    #[serde(rename = "type", default)]
    pub node_type: String,
    /// Producing plugin; overridden by the context owner when set.
    #[serde(default)]
    pub owner: String,
    /// Precomputed digest; computed from content when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_digest: Option<String>,
    /// Explicit creation instant (ms since epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    /// Explicit mutation instant (ms since epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<i64>,
}

/// Input to [`create_node`]: the internal descriptor, an optional parent
/// edge, and arbitrary user-visible fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeInput {
    /// Descriptor with id, type, and owner.
    pub internal: NodeInternalInput,
    /// Optional parent node id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// User-visible fields.
    #[serde(flatten)]
    pub fields: Map<String, JsonValue>,
}

impl NodeInput {
    /// Start an input for the given id and type.
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            internal: NodeInternalInput {
                id: id.into(),
                node_type: node_type.into(),
                ..Default::default()
            },
            parent: None,
            fields: Map::new(),
        }
    }

    /// Set the owning plugin.
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.internal.owner = owner.into();
        self
    }

    /// Set the parent node id.
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Add a user-visible field.
    pub fn field(mut self, name: impl Into<String>, value: JsonValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// Target forms accepted by [`delete_node`]: a bare id, a full node, or a
/// JSON object shaped `{internal:{id}}` or `{id}`.
#[derive(Debug, Clone)]
pub enum DeleteInput {
    /// Delete by id.
    Id(String),
    /// Delete the node behind this value.
    Node(Box<Node>),
    /// Delete by a JSON object carrying an id.
    Value(JsonValue),
}

impl From<&str> for DeleteInput {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}

impl From<String> for DeleteInput {
    fn from(id: String) -> Self {
        Self::Id(id)
    }
}

impl From<Node> for DeleteInput {
    fn from(node: Node) -> Self {
        Self::Node(Box::new(node))
    }
}

impl From<&Node> for DeleteInput {
    fn from(node: &Node) -> Self {
        Self::Node(Box::new(node.clone()))
    }
}

impl From<JsonValue> for DeleteInput {
    fn from(value: JsonValue) -> Self {
        Self::Value(value)
    }
}

impl DeleteInput {
    /// Extract the target node id, or fail with `InvalidInput`.
    fn node_id(&self) -> UdlResult<String> {
        match self {
            Self::Id(id) if !id.is_empty() => Ok(id.clone()),
            Self::Id(_) => Err(UdlError::invalid_input("delete target id is empty")),
            Self::Node(node) => Ok(node.internal.id.clone()),
            Self::Value(value) => value
                .get("internal")
                .and_then(|i| i.get("id"))
                .or_else(|| value.get("id"))
                .and_then(|id| id.as_str())
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    UdlError::invalid_input("delete target carries no id")
                }),
        }
    }
}

/// Create or update a node.
///
/// Fails with `InvalidInput` when the id or type is missing. For an
/// existing id, `created_at` is preserved and `modified_at` advances
/// monotonically; for a fresh id both default to now. An explicit
/// `created_at`/`modified_at` pair is taken verbatim (cache restores and
/// the mirror client rely on this).
///
/// Parent edges are maintained here: a changed `parent` removes the id from
/// the previous parent's children and appends it to the new parent's, never
/// duplicating. A parent id that does not exist yet is stored as-is.
///
/// Emits `created` for a fresh id, `updated` otherwise.
pub fn create_node(mut input: NodeInput, ctx: &ActionContext) -> UdlResult<Node> {
    if input.internal.id.is_empty() {
        return Err(UdlError::invalid_input("node internal.id is required"));
    }
    if input.internal.node_type.is_empty() {
        return Err(UdlError::invalid_input("node internal.type is required"));
    }

    if let Some(owner) = &ctx.owner {
        input.internal.owner = owner.clone();
    }
    for reserved in RESERVED_FIELDS {
        input.fields.remove(*reserved);
    }

    let existing = ctx.store.get(&input.internal.id);
    let now = Node::now_millis();

    let created_at = existing
        .as_ref()
        .map(|n| n.internal.created_at)
        .or(input.internal.created_at)
        .unwrap_or(now);
    let modified_at = match (input.internal.created_at, input.internal.modified_at) {
        (Some(_), Some(explicit)) => explicit,
        _ => {
            // Millisecond clocks can tie under rapid writes; keep per-id order.
            let floor = existing.as_ref().map(|n| n.internal.modified_at + 1);
            now.max(floor.unwrap_or(now))
        }
    };

    let mut node = Node {
        internal: NodeInternal {
            id: input.internal.id,
            node_type: input.internal.node_type,
            owner: input.internal.owner,
            content_digest: input.internal.content_digest.unwrap_or_default(),
            created_at,
            modified_at,
        },
        parent: input.parent,
        children: existing
            .as_ref()
            .map(|n| n.children.clone())
            .unwrap_or_default(),
        fields: input.fields,
    };
    if node.internal.content_digest.is_empty() {
        node.internal.content_digest = content_digest(&node);
    }

    let previous_parent = existing.as_ref().and_then(|n| n.parent.clone());
    if previous_parent != node.parent {
        if let Some(old_parent_id) = &previous_parent {
            if let Some(mut old_parent) = ctx.store.get(old_parent_id) {
                old_parent.remove_child(&node.internal.id);
                ctx.store.set(old_parent);
            }
        }
        if let Some(new_parent_id) = &node.parent {
            if let Some(mut new_parent) = ctx.store.get(new_parent_id) {
                new_parent.add_child(&node.internal.id);
                ctx.store.set(new_parent);
            }
        }
    }

    ctx.store.set(node.clone());
    let event = if existing.is_some() {
        NodeChangeEvent::updated(&node)
    } else {
        NodeChangeEvent::created(&node)
    };
    debug!(
        id = %node.internal.id,
        node_type = %node.internal.node_type,
        update = existing.is_some(),
        "node written"
    );
    ctx.bus.publish(event);

    Ok(node)
}

/// Delete a node.
///
/// Returns `Ok(false)` without side effects when the target does not exist.
/// With `ctx.cascade` set, children are deleted depth-first through this
/// same path, so each removal logs and emits like a direct delete. Without
/// cascade, former children are detached (`parent` cleared) and persisted.
pub fn delete_node(input: impl Into<DeleteInput>, ctx: &ActionContext) -> UdlResult<bool> {
    let id = input.into().node_id()?;
    let Some(node) = ctx.store.get(&id) else {
        return Ok(false);
    };

    if ctx.cascade {
        for child_id in node.children.clone() {
            delete_node(DeleteInput::Id(child_id), ctx)?;
        }
    } else {
        for child_id in &node.children {
            if let Some(mut child) = ctx.store.get(child_id) {
                child.parent = None;
                ctx.store.set(child);
            }
        }
    }

    if let Some(parent_id) = &node.parent {
        if let Some(mut parent) = ctx.store.get(parent_id) {
            parent.remove_child(&id);
            ctx.store.set(parent);
        }
    }

    ctx.store.delete(&id);
    if let Some(log) = &ctx.deletion_log {
        log.append(DeletionEntry {
            node_id: node.internal.id.clone(),
            node_type: node.internal.node_type.clone(),
            owner: node.internal.owner.clone(),
            deleted_at: Utc::now(),
        });
    }
    debug!(id = %id, node_type = %node.internal.node_type, "node deleted");
    ctx.bus.publish(NodeChangeEvent::deleted(&node));

    Ok(true)
}

/// Shallow-merge a patch into an existing node.
///
/// Reserved keys (`internal`, `parent`, `children`) in the patch are
/// ignored. The digest is recomputed and `modified_at` advances. Fails with
/// `NotFound` when the id is absent. Emits `updated`.
pub fn extend_node(
    id: &str,
    patch: Map<String, JsonValue>,
    ctx: &ActionContext,
) -> UdlResult<Node> {
    let mut node = ctx
        .store
        .get(id)
        .ok_or_else(|| UdlError::not_found(format!("node '{id}'")))?;

    for (key, value) in patch {
        if RESERVED_FIELDS.contains(&key.as_str()) {
            continue;
        }
        node.fields.insert(key, value);
    }
    node.refresh_digest();
    node.internal.modified_at = Node::now_millis().max(node.internal.modified_at + 1);

    ctx.store.set(node.clone());
    debug!(id = %id, "node extended");
    ctx.bus.publish(NodeChangeEvent::updated(&node));

    Ok(node)
}
