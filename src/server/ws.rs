/// WebSocket push channel.
///
/// Connected clients receive every node lifecycle event that matches their
/// subscription, plus `webhook:received` notifications for observability.
/// The broadcaster fans out through per-connection unbounded channels, so a
/// slow consumer never backs up the change bus; a send to a gone connection
/// is simply skipped.
///
/// Liveness uses protocol pings: every heartbeat interval a connection that
/// failed to pong since the previous tick is terminated, otherwise it is
/// marked suspect and pinged again.
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock, Weak};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::AppState;
use crate::events::{ChangeKind, NodeChangeEvent};
use crate::node::Node;
use crate::runtime::Runtime;

/// Default heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

// ── Wire protocol ────────────────────────────────────────────────────────

/// Payload of a node lifecycle message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeEventPayload {
    /// Id of the affected node.
    pub node_id: String,
    /// Content type of the affected node.
    pub node_type: String,
    /// The node body (`None` for deletes).
    pub data: Option<Node>,
    /// When the change was published.
    pub timestamp: DateTime<Utc>,
}

impl From<&NodeChangeEvent> for NodeEventPayload {
    fn from(event: &NodeChangeEvent) -> Self {
        Self {
            node_id: event.node_id.clone(),
            node_type: event.node_type.clone(),
            data: event.node.clone(),
            timestamp: event.timestamp,
        }
    }
}

/// Messages the server pushes to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsServerMessage {
    /// Greeting sent on accept.
    #[serde(rename = "connected")]
    Connected {
        /// Greeting payload.
        data: JsonValue,
    },
    /// Acknowledgment of a subscription change.
    #[serde(rename = "subscribed")]
    Subscribed {
        /// Echo of the accepted subscription.
        data: JsonValue,
    },
    /// Reply to an application-level ping.
    #[serde(rename = "pong")]
    Pong,
    /// A node was created.
    #[serde(rename = "node:created")]
    NodeCreated(NodeEventPayload),
    /// A node was updated.
    #[serde(rename = "node:updated")]
    NodeUpdated(NodeEventPayload),
    /// A node was deleted.
    #[serde(rename = "node:deleted")]
    NodeDeleted(NodeEventPayload),
    /// A webhook delivery reached a handler.
    #[serde(rename = "webhook:received")]
    #[serde(rename_all = "camelCase")]
    WebhookReceived {
        /// Plugin that handled the delivery.
        plugin_name: String,
        /// Parsed webhook body.
        body: JsonValue,
        /// Request headers of the delivery.
        headers: JsonValue,
        /// When the delivery was processed.
        timestamp: DateTime<Utc>,
    },
}

impl WsServerMessage {
    fn from_event(event: &NodeChangeEvent) -> Self {
        let payload = NodeEventPayload::from(event);
        match event.kind {
            ChangeKind::Created => Self::NodeCreated(payload),
            ChangeKind::Updated => Self::NodeUpdated(payload),
            ChangeKind::Deleted => Self::NodeDeleted(payload),
        }
    }

    /// The node type this message is about, when subscription filtering
    /// applies.
    fn node_type(&self) -> Option<&str> {
        match self {
            Self::NodeCreated(p) | Self::NodeUpdated(p) | Self::NodeDeleted(p) => {
                Some(&p.node_type)
            }
            _ => None,
        }
    }
}

/// Messages clients send to the server. Anything else is silently ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsClientMessage {
    /// Application-level ping.
    #[serde(rename = "ping")]
    Ping,
    /// Replace the connection's subscription.
    #[serde(rename = "subscribe")]
    Subscribe {
        /// `"*"` or a list of content types.
        data: SubscribeTarget,
    },
}

/// Subscription target: everything, or a set of types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubscribeTarget {
    /// A single string; `"*"` means everything.
    One(String),
    /// An explicit list of content types.
    Types(Vec<String>),
}

/// Per-connection subscription filter.
#[derive(Debug, Clone)]
pub enum SubscriptionFilter {
    /// Receive every node event.
    All,
    /// Receive events for these types only.
    Types(HashSet<String>),
}

impl SubscriptionFilter {
    /// Whether events for `node_type` pass this filter.
    pub fn matches(&self, node_type: &str) -> bool {
        match self {
            Self::All => true,
            Self::Types(types) => types.contains(node_type),
        }
    }
}

impl From<&SubscribeTarget> for SubscriptionFilter {
    fn from(target: &SubscribeTarget) -> Self {
        match target {
            SubscribeTarget::One(s) if s == "*" => Self::All,
            SubscribeTarget::One(s) => Self::Types(HashSet::from([s.clone()])),
            SubscribeTarget::Types(types) => Self::Types(types.iter().cloned().collect()),
        }
    }
}

// ── Server state ─────────────────────────────────────────────────────────

struct WsConnection {
    sender: UnboundedSender<WsMessage>,
    subscription: RwLock<SubscriptionFilter>,
    is_alive: AtomicBool,
}

impl WsConnection {
    fn send(&self, message: &WsServerMessage) {
        if let Ok(text) = serde_json::to_string(message) {
            // A closed channel means the socket task is gone; skip.
            let _ = self.sender.send(WsMessage::Text(text));
        }
    }
}

/// Connection registry plus the broadcast and heartbeat tasks.
pub struct WsState {
    connections: DashMap<Uuid, Arc<WsConnection>>,
    closed: AtomicBool,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl WsState {
    /// Start the push fabric over a runtime: subscribes to the change bus,
    /// arms the heartbeat, and installs the webhook observer.
    pub fn start(runtime: &Runtime, heartbeat_interval: Duration) -> Arc<Self> {
        let state = Arc::new(Self {
            connections: DashMap::new(),
            closed: AtomicBool::new(false),
            tasks: StdMutex::new(Vec::new()),
        });

        let broadcast_state = state.clone();
        let mut bus_rx = runtime.bus().subscribe();
        let broadcast_task = tokio::spawn(async move {
            loop {
                match bus_rx.recv().await {
                    Ok(event) => {
                        broadcast_state.broadcast(&WsServerMessage::from_event(&event));
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "websocket broadcaster lagged behind the change bus");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let heartbeat_state = state.clone();
        let heartbeat_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(heartbeat_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; connections start alive.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                heartbeat_state.heartbeat_tick();
            }
        });

        let observer_state = state.clone();
        runtime
            .webhook_dispatcher()
            .set_observer(Arc::new(move |item| {
                let headers: serde_json::Map<String, JsonValue> = item
                    .request
                    .headers
                    .iter()
                    .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
                    .collect();
                observer_state.broadcast(&WsServerMessage::WebhookReceived {
                    plugin_name: item.plugin_name.clone(),
                    body: item.parsed_body.clone(),
                    headers: JsonValue::Object(headers),
                    timestamp: Utc::now(),
                });
            }));

        state
            .tasks
            .lock()
            .expect("ws state poisoned")
            .extend([broadcast_task, heartbeat_task]);
        state
    }

    /// Send a message to every connection whose subscription matches.
    pub fn broadcast(&self, message: &WsServerMessage) {
        let node_type = message.node_type();
        for entry in self.connections.iter() {
            let conn = entry.value();
            if let Some(node_type) = node_type {
                let subscribed = conn
                    .subscription
                    .read()
                    .expect("ws subscription poisoned")
                    .matches(node_type);
                if !subscribed {
                    continue;
                }
            }
            conn.send(message);
        }
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn heartbeat_tick(&self) {
        let mut dead = Vec::new();
        for entry in self.connections.iter() {
            let conn = entry.value();
            // swap(false) returns the previous flag: a connection that never
            // ponged since the last tick is gone.
            if !conn.is_alive.swap(false, Ordering::SeqCst) {
                dead.push(*entry.key());
            } else {
                let _ = conn.sender.send(WsMessage::Ping(Vec::new()));
            }
        }
        for id in dead {
            debug!(connection = %id, "terminating silent websocket connection");
            self.connections.remove(&id);
        }
    }

    /// Drop every connection and stop the broadcast and heartbeat tasks.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for task in self.tasks.lock().expect("ws state poisoned").drain(..) {
            task.abort();
        }
        self.connections.clear();
    }
}

impl Drop for WsState {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Socket handling ──────────────────────────────────────────────────────

/// `GET /ws` upgrade handler.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let ws_state = state.ws.clone();
    ws.on_upgrade(move |socket| handle_socket(ws_state, socket))
}

async fn handle_socket(state: Arc<WsState>, mut socket: WebSocket) {
    if state.closed.load(Ordering::SeqCst) {
        return;
    }
    let id = Uuid::new_v4();
    let (sender, mut outbound) = mpsc::unbounded_channel::<WsMessage>();
    let conn = Arc::new(WsConnection {
        sender,
        subscription: RwLock::new(SubscriptionFilter::All),
        is_alive: AtomicBool::new(true),
    });
    conn.send(&WsServerMessage::Connected {
        data: json!({ "message": "Connected to UDL websocket server" }),
    });
    state.connections.insert(id, conn.clone());
    debug!(connection = %id, "websocket connected");

    // Only the registry keeps the connection alive: removal there closes
    // the outbound channel, which ends this task.
    let conn_weak: Weak<WsConnection> = Arc::downgrade(&conn);
    drop(conn);
    let conn = conn_weak;

    loop {
        tokio::select! {
            queued = outbound.recv() => match queued {
                Some(message) => {
                    if socket.send(message).await.is_err() {
                        break;
                    }
                }
                None => {
                    let _ = socket.send(WsMessage::Close(None)).await;
                    break;
                }
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    let Some(conn) = conn.upgrade() else { break };
                    handle_client_text(&conn, &text);
                }
                Some(Ok(WsMessage::Pong(_))) => {
                    let Some(conn) = conn.upgrade() else { break };
                    conn.is_alive.store(true, Ordering::SeqCst);
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }

    state.connections.remove(&id);
    debug!(connection = %id, "websocket disconnected");
}

/// Dispatch one inbound text frame. Malformed JSON and unknown message
/// types are silently ignored.
fn handle_client_text(conn: &WsConnection, text: &str) {
    let Ok(message) = serde_json::from_str::<WsClientMessage>(text) else {
        return;
    };
    match message {
        WsClientMessage::Ping => conn.send(&WsServerMessage::Pong),
        WsClientMessage::Subscribe { data } => {
            let filter = SubscriptionFilter::from(&data);
            *conn.subscription.write().expect("ws subscription poisoned") = filter;
            let echoed = match &data {
                SubscribeTarget::One(s) => json!({ "types": s }),
                SubscribeTarget::Types(types) => json!({ "types": types }),
            };
            conn.send(&WsServerMessage::Subscribed { data: echoed });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_filter_matches() {
        assert!(SubscriptionFilter::All.matches("Product"));

        let filter =
            SubscriptionFilter::from(&SubscribeTarget::Types(vec!["Product".to_string()]));
        assert!(filter.matches("Product"));
        assert!(!filter.matches("Collection"));

        let wildcard = SubscriptionFilter::from(&SubscribeTarget::One("*".to_string()));
        assert!(wildcard.matches("Anything"));
    }

    #[test]
    fn server_messages_serialize_with_tagged_types() {
        let message = WsServerMessage::Pong;
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({ "type": "pong" })
        );

        let payload = NodeEventPayload {
            node_id: "p1".into(),
            node_type: "Product".into(),
            data: None,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(WsServerMessage::NodeDeleted(payload)).unwrap();
        assert_eq!(value["type"], json!("node:deleted"));
        assert_eq!(value["nodeId"], json!("p1"));
        assert_eq!(value["nodeType"], json!("Product"));
    }

    #[test]
    fn client_messages_parse_both_subscribe_forms() {
        let wildcard: WsClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","data":"*"}"#).unwrap();
        assert!(matches!(
            wildcard,
            WsClientMessage::Subscribe {
                data: SubscribeTarget::One(_)
            }
        ));

        let listed: WsClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","data":["Product"]}"#).unwrap();
        assert!(matches!(
            listed,
            WsClientMessage::Subscribe {
                data: SubscribeTarget::Types(_)
            }
        ));

        assert!(serde_json::from_str::<WsClientMessage>(r#"{"type":"mystery"}"#).is_err());
    }
}
