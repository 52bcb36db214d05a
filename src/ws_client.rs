/// Reconnecting WebSocket client that mirrors a remote store.
///
/// The client speaks the same protocol the push server emits: on connect it
/// subscribes to `*`, then applies every `node:created`/`node:updated`
/// message as a local overwrite (keeping the remote's internal descriptor)
/// and every `node:deleted` as a local delete. Dropped connections are
/// retried on a fixed delay up to a configurable attempt count; a periodic
/// protocol ping keeps intermediaries from idling the connection out.
use crate::server::ws::{SubscribeTarget, WsClientMessage, WsServerMessage};
use crate::store::NodeStore;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct WsClientConfig {
    /// `ws://` URL of the remote push channel.
    pub url: String,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Consecutive failed attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Keep-warm protocol ping interval.
    pub ping_interval: Duration,
}

impl WsClientConfig {
    /// Defaults: 1s reconnect delay, 10 attempts, 30s pings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_attempts: 10,
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// Handle to a running mirror client.
pub struct WsClient {
    closed: Arc<AtomicBool>,
    task: StdMutex<Option<JoinHandle<()>>>,
}

impl WsClient {
    /// Start mirroring the remote store into `store`.
    pub fn connect(store: Arc<NodeStore>, config: WsClientConfig) -> Self {
        let closed = Arc::new(AtomicBool::new(false));
        let task_closed = closed.clone();
        let task = tokio::spawn(async move {
            run(store, config, task_closed).await;
        });
        Self {
            closed,
            task: StdMutex::new(Some(task)),
        }
    }

    /// Whether the client has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop mirroring and suppress further reconnects. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.task.lock().expect("ws client poisoned").take() {
            task.abort();
        }
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run(store: Arc<NodeStore>, config: WsClientConfig, closed: Arc<AtomicBool>) {
    let mut failed_attempts: u32 = 0;
    loop {
        if closed.load(Ordering::SeqCst) {
            return;
        }
        match connect_async(config.url.as_str()).await {
            Ok((stream, _response)) => {
                info!(url = %config.url, "mirror client connected");
                failed_attempts = 0;
                session(stream, &store, &closed, config.ping_interval).await;
                if closed.load(Ordering::SeqCst) {
                    return;
                }
                warn!(url = %config.url, "mirror connection lost; reconnecting");
            }
            Err(e) => {
                failed_attempts += 1;
                warn!(
                    url = %config.url,
                    attempt = failed_attempts,
                    error = %e,
                    "mirror connection failed"
                );
                if failed_attempts >= config.max_reconnect_attempts {
                    warn!(url = %config.url, "mirror client giving up after max attempts");
                    closed.store(true, Ordering::SeqCst);
                    return;
                }
            }
        }
        tokio::time::sleep(config.reconnect_delay).await;
    }
}

async fn session<S>(
    mut stream: S,
    store: &NodeStore,
    closed: &AtomicBool,
    ping_interval: Duration,
) where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + SinkExt<Message>
        + Unpin,
{
    let subscribe = WsClientMessage::Subscribe {
        data: SubscribeTarget::One("*".into()),
    };
    let Ok(text) = serde_json::to_string(&subscribe) else {
        return;
    };
    if stream.send(Message::Text(text)).await.is_err() {
        return;
    }

    let mut ticker = tokio::time::interval(ping_interval);
    ticker.tick().await;
    loop {
        if closed.load(Ordering::SeqCst) {
            let _ = stream.send(Message::Close(None)).await;
            return;
        }
        tokio::select! {
            _ = ticker.tick() => {
                if stream.send(Message::Ping(Vec::new())).await.is_err() {
                    return;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => apply_message(store, &text),
                Some(Ok(Message::Close(_))) | None => return,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "mirror read failed");
                    return;
                }
            },
        }
    }
}

/// Apply one server message to the local store. Unknown or malformed
/// messages are ignored; the remote owns the protocol.
fn apply_message(store: &NodeStore, text: &str) {
    let Ok(message) = serde_json::from_str::<WsServerMessage>(text) else {
        return;
    };
    match message {
        WsServerMessage::NodeCreated(payload) | WsServerMessage::NodeUpdated(payload) => {
            if let Some(node) = payload.data {
                debug!(id = %node.internal.id, "mirror upsert");
                store.set(node);
            }
        }
        WsServerMessage::NodeDeleted(payload) => {
            debug!(id = %payload.node_id, "mirror delete");
            store.delete(&payload.node_id);
        }
        _ => {}
    }
}
