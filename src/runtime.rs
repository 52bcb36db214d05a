/// The top-level runtime object.
///
/// Rather than true process globals, the change bus, deletion log,
/// reference registry, webhook registry/queue, readiness checks, and schema
/// overrides are named singletons owned by one `Runtime` that is passed
/// into handlers. A `Runtime` clones cheaply (everything is behind Arcs),
/// so servers, plugins, and tests can share one.
///
/// `reset` restores pristine state between tests; `close` tears down timers
/// so a runtime can be dropped without leaking armed debounce tasks.
use crate::actions::ActionContext;
use crate::deletion_log::DeletionLog;
use crate::events::ChangeBus;
use crate::references::ReferenceRegistry;
use crate::schema::SchemaOverrides;
use crate::server::health::ReadinessChecks;
use crate::store::NodeStore;
use crate::webhooks::{WebhookDispatcher, WebhookQueue, WebhookRegistry};
use std::sync::Arc;
use std::time::Duration;

struct RuntimeInner {
    store: Arc<NodeStore>,
    bus: Arc<ChangeBus>,
    deletion_log: Arc<DeletionLog>,
    references: Arc<ReferenceRegistry>,
    webhooks: Arc<WebhookRegistry>,
    webhook_queue: WebhookQueue,
    dispatcher: Arc<WebhookDispatcher>,
    readiness: Arc<ReadinessChecks>,
    overrides: Arc<SchemaOverrides>,
}

/// Shared handle to the node-graph runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Build a runtime with the default webhook debounce window.
    pub fn new() -> Self {
        Self::with_debounce(crate::webhooks::queue::DEFAULT_DEBOUNCE)
    }

    /// Build a runtime with a custom webhook debounce window.
    pub fn with_debounce(debounce: Duration) -> Self {
        let store = Arc::new(NodeStore::new());
        let bus = Arc::new(ChangeBus::new());
        let deletion_log = Arc::new(DeletionLog::new());
        let webhooks = Arc::new(WebhookRegistry::new());

        let webhook_queue = WebhookQueue::with_debounce(debounce);
        let dispatcher = Arc::new(WebhookDispatcher::new(
            webhooks.clone(),
            store.clone(),
            bus.clone(),
            deletion_log.clone(),
        ));
        webhook_queue.set_processor(dispatcher.clone());

        let readiness = Arc::new(ReadinessChecks::with_defaults());

        Self {
            inner: Arc::new(RuntimeInner {
                store,
                bus,
                deletion_log,
                references: Arc::new(ReferenceRegistry::new()),
                webhooks,
                webhook_queue,
                dispatcher,
                readiness,
                overrides: Arc::new(SchemaOverrides::new()),
            }),
        }
    }

    /// The node store.
    pub fn store(&self) -> &Arc<NodeStore> {
        &self.inner.store
    }

    /// The change bus.
    pub fn bus(&self) -> &Arc<ChangeBus> {
        &self.inner.bus
    }

    /// The deletion log.
    pub fn deletion_log(&self) -> &Arc<DeletionLog> {
        &self.inner.deletion_log
    }

    /// The reference resolver registry.
    pub fn references(&self) -> &Arc<ReferenceRegistry> {
        &self.inner.references
    }

    /// The webhook handler registry.
    pub fn webhooks(&self) -> &Arc<WebhookRegistry> {
        &self.inner.webhooks
    }

    /// The webhook queue.
    pub fn webhook_queue(&self) -> &WebhookQueue {
        &self.inner.webhook_queue
    }

    /// The webhook dispatcher (for observer installation).
    pub fn webhook_dispatcher(&self) -> &Arc<WebhookDispatcher> {
        &self.inner.dispatcher
    }

    /// The readiness check registry.
    pub fn readiness(&self) -> &Arc<ReadinessChecks> {
        &self.inner.readiness
    }

    /// The schema override registry.
    pub fn schema_overrides(&self) -> &Arc<SchemaOverrides> {
        &self.inner.overrides
    }

    /// An action context wired to this runtime's store, bus, and deletion
    /// log, with cascade deletes enabled.
    pub fn action_context(&self) -> ActionContext {
        ActionContext::new(self.inner.store.clone(), self.inner.bus.clone())
            .with_deletion_log(self.inner.deletion_log.clone())
    }

    /// An action context owned by the named plugin.
    pub fn action_context_for(&self, owner: &str) -> ActionContext {
        self.action_context().with_owner(owner)
    }

    /// Restore pristine state: empty store, logs, and registries.
    pub fn reset(&self) {
        self.inner.webhook_queue.clear();
        self.inner.store.clear();
        self.inner.deletion_log.clear();
        self.inner.references.clear();
        self.inner.webhooks.clear();
        self.inner.overrides.clear();
        self.inner.readiness.reset_defaults();
    }

    /// Tear down timers and pending work. Idempotent.
    pub fn close(&self) {
        self.inner.webhook_queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{create_node, NodeInput};

    #[tokio::test]
    async fn runtime_wires_actions_to_store_and_log() {
        let runtime = Runtime::new();
        let ctx = runtime.action_context_for("test-plugin");

        create_node(NodeInput::new("p1", "Product"), &ctx).unwrap();
        assert_eq!(runtime.store().size(), 1);
        assert_eq!(
            runtime.store().get("p1").unwrap().internal.owner,
            "test-plugin"
        );

        crate::actions::delete_node("p1", &ctx).unwrap();
        assert_eq!(runtime.deletion_log().len(), 1);
    }

    #[tokio::test]
    async fn reset_restores_pristine_state() {
        let runtime = Runtime::new();
        let ctx = runtime.action_context();
        create_node(NodeInput::new("p1", "Product"), &ctx).unwrap();
        crate::actions::delete_node("p1", &ctx).unwrap();

        runtime.reset();
        assert_eq!(runtime.store().size(), 0);
        assert_eq!(runtime.deletion_log().len(), 0);
        assert!(runtime.webhooks().is_empty());
    }
}
