/// Process-wide change bus for node lifecycle events.
///
/// Every successful mutation in the actions layer publishes exactly one
/// [`NodeChangeEvent`]. Consumers — the WebSocket broadcaster, codegen watch,
/// tests — subscribe through a tokio broadcast channel, so a slow consumer
/// lags and drops rather than backing up writers.
///
/// Events for a single node id are delivered in the order the mutations
/// completed on the store; across ids no global order is promised.
use crate::node::Node;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default channel capacity for the change bus.
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Kind of node lifecycle change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// A node appeared at a fresh id.
    Created,
    /// An existing node was overwritten or extended.
    Updated,
    /// A node was removed.
    Deleted,
}

/// A node lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeChangeEvent {
    /// What happened.
    pub kind: ChangeKind,
    /// Id of the affected node.
    pub node_id: String,
    /// Content type of the affected node.
    pub node_type: String,
    /// The node after the change (`None` for deletes).
    pub node: Option<Node>,
    /// When the change was published.
    pub timestamp: DateTime<Utc>,
}

impl NodeChangeEvent {
    /// Build a created event from the stored node.
    pub fn created(node: &Node) -> Self {
        Self::with_kind(ChangeKind::Created, node)
    }

    /// Build an updated event from the stored node.
    pub fn updated(node: &Node) -> Self {
        Self::with_kind(ChangeKind::Updated, node)
    }

    /// Build a deleted event; the payload carries no node body.
    pub fn deleted(node: &Node) -> Self {
        Self {
            kind: ChangeKind::Deleted,
            node_id: node.internal.id.clone(),
            node_type: node.internal.node_type.clone(),
            node: None,
            timestamp: Utc::now(),
        }
    }

    fn with_kind(kind: ChangeKind, node: &Node) -> Self {
        Self {
            kind,
            node_id: node.internal.id.clone(),
            node_type: node.internal.node_type.clone(),
            node: Some(node.clone()),
            timestamp: Utc::now(),
        }
    }
}

/// Broadcast bus for [`NodeChangeEvent`]s.
#[derive(Debug)]
pub struct ChangeBus {
    sender: broadcast::Sender<NodeChangeEvent>,
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeBus {
    /// Create a bus with the default channel capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus with a custom channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeChangeEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to every live subscriber.
    ///
    /// A send with no subscribers is not an error; the event is dropped.
    pub fn publish(&self, event: NodeChangeEvent) {
        let _ = self.sender.send(event);
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeInternal;
    use serde_json::Map;

    fn make_node(id: &str) -> Node {
        let mut node = Node {
            internal: NodeInternal {
                id: id.into(),
                node_type: "Product".into(),
                owner: "test".into(),
                content_digest: String::new(),
                created_at: 0,
                modified_at: 0,
            },
            parent: None,
            children: Vec::new(),
            fields: Map::new(),
        };
        node.refresh_digest();
        node
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = ChangeBus::new();
        let mut rx = bus.subscribe();

        bus.publish(NodeChangeEvent::created(&make_node("p1")));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Created);
        assert_eq!(event.node_id, "p1");
        assert!(event.node.is_some());
    }

    #[tokio::test]
    async fn deleted_events_carry_no_node_body() {
        let bus = ChangeBus::new();
        let mut rx = bus.subscribe();

        bus.publish(NodeChangeEvent::deleted(&make_node("p1")));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Deleted);
        assert!(event.node.is_none());
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = ChangeBus::new();
        bus.publish(NodeChangeEvent::created(&make_node("p1")));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
