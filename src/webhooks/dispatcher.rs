/// Batch processor that routes work items to registered handlers.
///
/// For each item the dispatcher looks up the registration, builds a
/// [`WebhookHandlerContext`] whose action context is scoped to the owning
/// plugin, and runs the handler. A missing registration or a failing
/// handler is logged and never aborts the rest of the batch: by the time a
/// batch runs, the HTTP caller has long been answered 202.
///
/// An optional observer callback fires after each processed item; the
/// WebSocket server installs one to broadcast `webhook:received` messages.
use super::queue::{BatchProcessor, WebhookWorkItem};
use super::registry::{WebhookHandlerContext, WebhookRegistry};
use crate::actions::ActionContext;
use crate::deletion_log::DeletionLog;
use crate::events::ChangeBus;
use crate::store::NodeStore;
use async_trait::async_trait;
use std::sync::{Arc, Mutex as StdMutex};
use tracing::{error, warn};

/// Fired after each item that reached a handler.
pub type WebhookObserver = Arc<dyn Fn(&WebhookWorkItem) + Send + Sync>;

/// Routes batches to plugin handlers.
pub struct WebhookDispatcher {
    registry: Arc<WebhookRegistry>,
    store: Arc<NodeStore>,
    bus: Arc<ChangeBus>,
    deletion_log: Arc<DeletionLog>,
    observer: StdMutex<Option<WebhookObserver>>,
}

impl WebhookDispatcher {
    /// Create a dispatcher over the runtime's shared pieces.
    pub fn new(
        registry: Arc<WebhookRegistry>,
        store: Arc<NodeStore>,
        bus: Arc<ChangeBus>,
        deletion_log: Arc<DeletionLog>,
    ) -> Self {
        Self {
            registry,
            store,
            bus,
            deletion_log,
            observer: StdMutex::new(None),
        }
    }

    /// Install the per-item observer (replacing any previous one).
    pub fn set_observer(&self, observer: WebhookObserver) {
        *self.observer.lock().expect("dispatcher poisoned") = Some(observer);
    }

    fn action_context_for(&self, plugin_name: &str) -> ActionContext {
        ActionContext::new(self.store.clone(), self.bus.clone())
            .with_deletion_log(self.deletion_log.clone())
            .with_owner(plugin_name)
    }
}

#[async_trait]
impl BatchProcessor for WebhookDispatcher {
    async fn process(&self, batch: Vec<WebhookWorkItem>) {
        for item in batch {
            let Some(registration) = self.registry.lookup(&item.plugin_name, &item.path) else {
                warn!(
                    plugin = %item.plugin_name,
                    path = %item.path,
                    "webhook handler disappeared between enqueue and dispatch"
                );
                continue;
            };

            let ctx = WebhookHandlerContext {
                store: self.store.clone(),
                actions: self.action_context_for(&item.plugin_name),
                body: item.parsed_body.clone(),
                raw_body: item.raw_body.clone(),
                request: item.request.clone(),
            };

            if let Err(e) = registration.handler.handle(ctx).await {
                error!(
                    plugin = %item.plugin_name,
                    path = %item.path,
                    error = %e,
                    "webhook handler failed"
                );
            }

            let observer = self.observer.lock().expect("dispatcher poisoned").clone();
            if let Some(observer) = observer {
                observer(&item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UdlError;
    use crate::webhooks::registry::{handler_fn, WebhookRegistration};
    use crate::webhooks::WebhookRequest;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dispatcher_with_registry() -> (WebhookDispatcher, Arc<WebhookRegistry>) {
        let registry = Arc::new(WebhookRegistry::new());
        let dispatcher = WebhookDispatcher::new(
            registry.clone(),
            Arc::new(NodeStore::new()),
            Arc::new(ChangeBus::new()),
            Arc::new(DeletionLog::new()),
        );
        (dispatcher, registry)
    }

    fn item(path: &str, body: serde_json::Value) -> WebhookWorkItem {
        WebhookWorkItem {
            plugin_name: "shop".into(),
            path: path.into(),
            request: WebhookRequest::default(),
            raw_body: Vec::new(),
            parsed_body: body,
        }
    }

    #[tokio::test]
    async fn items_reach_their_handlers_in_order() {
        let (dispatcher, registry) = dispatcher_with_registry();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen_in_handler = seen.clone();
        registry.register(
            "shop",
            WebhookRegistration::new(
                "orders",
                handler_fn(move |ctx| {
                    let seen = seen_in_handler.clone();
                    async move {
                        seen.lock().unwrap().push(ctx.body["n"].clone());
                        Ok(())
                    }
                }),
            ),
        );

        dispatcher
            .process(vec![
                item("orders", json!({"n": 1})),
                item("orders", json!({"n": 2})),
                item("orders", json!({"n": 3})),
            ])
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![json!(1), json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn a_failing_handler_does_not_abort_the_batch() {
        let (dispatcher, registry) = dispatcher_with_registry();
        let succeeded = Arc::new(AtomicUsize::new(0));
        let counter = succeeded.clone();
        registry.register(
            "shop",
            WebhookRegistration::new(
                "orders",
                handler_fn(move |ctx| {
                    let counter = counter.clone();
                    async move {
                        if ctx.body["fail"] == json!(true) {
                            return Err(UdlError::Internal("boom".into()));
                        }
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            ),
        );

        dispatcher
            .process(vec![
                item("orders", json!({"fail": true})),
                item("orders", json!({"fail": false})),
            ])
            .await;

        assert_eq!(succeeded.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_action_context_is_owner_scoped() {
        let (dispatcher, registry) = dispatcher_with_registry();
        let store = dispatcher.store.clone();
        registry.register(
            "shop",
            WebhookRegistration::new(
                "products",
                handler_fn(|ctx| async move {
                    crate::actions::create_node(
                        crate::actions::NodeInput::new("p1", "Product"),
                        &ctx.actions,
                    )?;
                    Ok(())
                }),
            ),
        );

        dispatcher.process(vec![item("products", json!({}))]).await;

        assert_eq!(store.get("p1").unwrap().internal.owner, "shop");
    }

    #[tokio::test]
    async fn observer_fires_per_item() {
        let (dispatcher, registry) = dispatcher_with_registry();
        registry.register(
            "shop",
            WebhookRegistration::new("orders", handler_fn(|_| async { Ok(()) })),
        );
        let observed = Arc::new(AtomicUsize::new(0));
        let counter = observed.clone();
        dispatcher.set_observer(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        dispatcher
            .process(vec![item("orders", json!({})), item("orders", json!({}))])
            .await;

        assert_eq!(observed.load(Ordering::SeqCst), 2);
    }
}
