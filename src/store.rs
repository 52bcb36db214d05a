/// In-memory node store with type and field indexes.
///
/// The store is the content-addressed heart of the data layer. It maintains
/// three index structures alongside the node map:
///
/// 1. **Node map**: id → [`Node`]
/// 2. **Type index**: content type → set of node ids of that type
/// 3. **Field indexes**: (type, field, value) → node id, for registered fields
///
/// All maps are thread-safe via DashMap. The store is treated as
/// single-writer per logical operation: the actions layer serializes its own
/// mutations, while readers (sync endpoint, WebSocket broadcast, codegen
/// snapshots) run concurrently and receive cloned nodes, so a reader never
/// observes a partially-updated node.
///
/// Field indexes are designed for slug-like unique lookups: when multiple
/// nodes share an indexed value, the last write wins.
use crate::node::Node;
use crate::schema::TypeDefinition;
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;

/// Key for a single field-index entry.
///
/// The value component is the JSON serialization of the indexed field value,
/// which is canonical for scalars and cheap to compare.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FieldIndexKey {
    node_type: String,
    field: String,
    value: String,
}

impl FieldIndexKey {
    fn new(node_type: &str, field: &str, value: &JsonValue) -> Self {
        Self {
            node_type: node_type.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

/// Counts reported by [`NodeStore::stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of live nodes.
    pub node_count: usize,
    /// Number of distinct content types with at least one node.
    pub type_count: usize,
    /// Number of registered field indexes across all types.
    pub index_count: usize,
}

/// Thread-safe mapping id → node with derived indexes.
#[derive(Debug, Default)]
pub struct NodeStore {
    /// id → node
    nodes: DashMap<String, Node>,
    /// type → ids of that type (ordered for deterministic snapshots)
    type_index: DashMap<String, BTreeSet<String>>,
    /// type → registered index field names
    registered_indexes: DashMap<String, BTreeSet<String>>,
    /// (type, field, value) → node id
    field_index: DashMap<FieldIndexKey, String>,
    /// type → inferred or declared schema
    type_schemas: DashMap<String, TypeDefinition>,
}

impl NodeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a node by id. Returns a point-in-time clone.
    pub fn get(&self, id: &str) -> Option<Node> {
        self.nodes.get(id).map(|n| n.clone())
    }

    /// Check whether a node id exists.
    pub fn has(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Upsert a node, maintaining the type index and all registered field
    /// indexes for its type.
    ///
    /// If a node already exists at the same id, its old index entries are
    /// removed first; this covers both value changes and type changes. The
    /// store never touches `created_at`, `modified_at`, or `content_digest`:
    /// those belong to the actions layer.
    pub fn set(&self, node: Node) {
        let id = node.internal.id.clone();

        if let Some(previous) = self.nodes.get(&id).map(|n| n.clone()) {
            self.remove_index_entries(&previous);
        }

        self.type_index
            .entry(node.internal.node_type.clone())
            .or_default()
            .insert(id.clone());
        self.add_field_index_entries(&node);
        self.nodes.insert(id, node);
    }

    /// Remove a node and every index entry that referenced it.
    ///
    /// The type is dropped from the type list when its last node goes away.
    /// This does not cascade to children and does not emit events; both are
    /// policies of the actions layer. Returns the removed node.
    pub fn delete(&self, id: &str) -> Option<Node> {
        let (_, node) = self.nodes.remove(id)?;
        self.remove_index_entries(&node);
        Some(node)
    }

    /// Snapshot every node in the store.
    pub fn get_all(&self) -> Vec<Node> {
        self.nodes.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Every node of the given content type.
    pub fn get_by_type(&self, node_type: &str) -> Vec<Node> {
        let Some(ids) = self.type_index.get(node_type) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| self.nodes.get(id).map(|n| n.clone()))
            .collect()
    }

    /// Content types with at least one live node, sorted.
    pub fn get_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .type_index
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        types.sort();
        types
    }

    /// Number of live nodes.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Register a field index for a type.
    ///
    /// Existing nodes of the type are indexed immediately; later writes keep
    /// the index current.
    pub fn register_index(&self, node_type: &str, field: &str) {
        let newly_added = self
            .registered_indexes
            .entry(node_type.to_string())
            .or_default()
            .insert(field.to_string());
        if !newly_added {
            return;
        }
        for node in self.get_by_type(node_type) {
            if let Some(value) = node.field(field) {
                self.field_index.insert(
                    FieldIndexKey::new(node_type, field, value),
                    node.internal.id.clone(),
                );
            }
        }
    }

    /// Look up a node by an indexed field value.
    pub fn get_by_field(&self, node_type: &str, field: &str, value: &JsonValue) -> Option<Node> {
        let key = FieldIndexKey::new(node_type, field, value);
        let id = self.field_index.get(&key)?.clone();
        self.get(&id)
    }

    /// Field names with a registered index for the given type, sorted.
    pub fn get_registered_indexes(&self, node_type: &str) -> Vec<String> {
        self.registered_indexes
            .get(node_type)
            .map(|fields| fields.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The recorded schema for a type, if any.
    pub fn get_type_schema(&self, node_type: &str) -> Option<TypeDefinition> {
        self.type_schemas.get(node_type).map(|s| s.clone())
    }

    /// Record a schema for a type.
    pub fn set_type_schema(&self, node_type: &str, schema: TypeDefinition) {
        self.type_schemas.insert(node_type.to_string(), schema);
    }

    /// Counts of nodes, types, and registered indexes.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            node_count: self.nodes.len(),
            type_count: self.type_index.len(),
            index_count: self
                .registered_indexes
                .iter()
                .map(|entry| entry.value().len())
                .sum(),
        }
    }

    /// Drop every node, index, and schema. Used by tests and `Runtime::reset`.
    pub fn clear(&self) {
        self.nodes.clear();
        self.type_index.clear();
        self.registered_indexes.clear();
        self.field_index.clear();
        self.type_schemas.clear();
    }

    fn add_field_index_entries(&self, node: &Node) {
        let Some(fields) = self.registered_indexes.get(&node.internal.node_type) else {
            return;
        };
        for field in fields.iter() {
            if let Some(value) = node.field(field) {
                self.field_index.insert(
                    FieldIndexKey::new(&node.internal.node_type, field, value),
                    node.internal.id.clone(),
                );
            }
        }
    }

    /// Remove the type-index entry and any field-index entries still pointing
    /// at this node. An index slot taken over by a later write (last-wins) is
    /// left alone.
    fn remove_index_entries(&self, node: &Node) {
        let node_type = &node.internal.node_type;
        let mut drop_type = false;
        if let Some(mut ids) = self.type_index.get_mut(node_type) {
            ids.remove(&node.internal.id);
            drop_type = ids.is_empty();
        }
        if drop_type {
            self.type_index
                .remove_if(node_type, |_, ids| ids.is_empty());
        }

        if let Some(fields) = self.registered_indexes.get(node_type) {
            for field in fields.iter() {
                if let Some(value) = node.field(field) {
                    let key = FieldIndexKey::new(node_type, field, value);
                    self.field_index
                        .remove_if(&key, |_, owner| owner == &node.internal.id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeInternal;
    use serde_json::{json, Map};

    fn make_node(id: &str, node_type: &str, fields: &[(&str, JsonValue)]) -> Node {
        let mut map = Map::new();
        for (k, v) in fields {
            map.insert((*k).to_string(), v.clone());
        }
        let mut node = Node {
            internal: NodeInternal {
                id: id.into(),
                node_type: node_type.into(),
                owner: "test".into(),
                content_digest: String::new(),
                created_at: Node::now_millis(),
                modified_at: Node::now_millis(),
            },
            parent: None,
            children: Vec::new(),
            fields: map,
        };
        node.refresh_digest();
        node
    }

    #[test]
    fn set_and_get_round_trip() {
        let store = NodeStore::new();
        store.set(make_node("p1", "Product", &[("title", json!("Widget"))]));

        let node = store.get("p1").unwrap();
        assert_eq!(node.field("title"), Some(&json!("Widget")));
        assert!(store.has("p1"));
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn type_index_tracks_membership() {
        let store = NodeStore::new();
        store.set(make_node("p1", "Product", &[]));
        store.set(make_node("p2", "Product", &[]));
        store.set(make_node("c1", "Collection", &[]));

        assert_eq!(store.get_by_type("Product").len(), 2);
        assert_eq!(store.get_types(), vec!["Collection", "Product"]);

        store.delete("c1");
        assert_eq!(store.get_types(), vec!["Product"]);
        assert!(store.get_by_type("Collection").is_empty());
    }

    #[test]
    fn replacing_a_node_with_new_type_moves_index_entries() {
        let store = NodeStore::new();
        store.set(make_node("x", "Product", &[]));
        store.set(make_node("x", "Collection", &[]));

        assert!(store.get_by_type("Product").is_empty());
        assert_eq!(store.get_by_type("Collection").len(), 1);
        assert_eq!(store.get_types(), vec!["Collection"]);
    }

    #[test]
    fn field_index_lookup() {
        let store = NodeStore::new();
        store.register_index("Product", "slug");
        store.set(make_node("p1", "Product", &[("slug", json!("widget"))]));

        let found = store
            .get_by_field("Product", "slug", &json!("widget"))
            .unwrap();
        assert_eq!(found.internal.id, "p1");
        assert_eq!(store.get_registered_indexes("Product"), vec!["slug"]);
    }

    #[test]
    fn field_index_registered_after_nodes_exist() {
        let store = NodeStore::new();
        store.set(make_node("p1", "Product", &[("slug", json!("widget"))]));
        store.register_index("Product", "slug");

        assert!(store
            .get_by_field("Product", "slug", &json!("widget"))
            .is_some());
    }

    #[test]
    fn field_index_last_write_wins() {
        let store = NodeStore::new();
        store.register_index("Product", "slug");
        store.set(make_node("p1", "Product", &[("slug", json!("widget"))]));
        store.set(make_node("p2", "Product", &[("slug", json!("widget"))]));

        let found = store
            .get_by_field("Product", "slug", &json!("widget"))
            .unwrap();
        assert_eq!(found.internal.id, "p2");

        // Deleting the loser must not clobber the winner's slot.
        store.delete("p1");
        assert!(store
            .get_by_field("Product", "slug", &json!("widget"))
            .is_some());
    }

    #[test]
    fn delete_removes_field_index_entries() {
        let store = NodeStore::new();
        store.register_index("Product", "slug");
        store.set(make_node("p1", "Product", &[("slug", json!("widget"))]));
        store.delete("p1");

        assert!(store
            .get_by_field("Product", "slug", &json!("widget"))
            .is_none());
    }

    #[test]
    fn updating_an_indexed_field_drops_the_old_entry() {
        let store = NodeStore::new();
        store.register_index("Product", "slug");
        store.set(make_node("p1", "Product", &[("slug", json!("old"))]));
        store.set(make_node("p1", "Product", &[("slug", json!("new"))]));

        assert!(store.get_by_field("Product", "slug", &json!("old")).is_none());
        assert!(store.get_by_field("Product", "slug", &json!("new")).is_some());
    }

    #[test]
    fn stats_counts() {
        let store = NodeStore::new();
        store.register_index("Product", "slug");
        store.set(make_node("p1", "Product", &[]));
        store.set(make_node("c1", "Collection", &[]));

        let stats = store.stats();
        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.type_count, 2);
        assert_eq!(stats.index_count, 1);
    }
}
