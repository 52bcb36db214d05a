/// Path-based webhook handler registry.
///
/// Plugins register handlers under `(plugin name, path)`; the HTTP surface
/// maps `POST /_webhooks/<plugin>/<path...>` onto a lookup here. An optional
/// signature verifier guards each registration and runs against the raw
/// body before anything is enqueued.
use super::WebhookRequest;
use crate::actions::ActionContext;
use crate::error::UdlResult;
use crate::store::NodeStore;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use std::future::Future;
use std::sync::Arc;

/// Verifies a webhook's authenticity from the request parts and raw body.
pub type SignatureVerifier = Arc<dyn Fn(&WebhookRequest, &[u8]) -> bool + Send + Sync>;

/// Everything a webhook handler gets to work with.
pub struct WebhookHandlerContext {
    /// The node store (reads).
    pub store: Arc<NodeStore>,
    /// Action context scoped to the owning plugin (writes).
    pub actions: ActionContext,
    /// Parsed JSON body.
    pub body: JsonValue,
    /// Raw body bytes, for handlers that re-verify or re-parse.
    pub raw_body: Vec<u8>,
    /// The originating request parts.
    pub request: WebhookRequest,
}

/// A registered webhook handler.
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    /// Process one webhook delivery.
    async fn handle(&self, ctx: WebhookHandlerContext) -> UdlResult<()>;
}

struct FnWebhookHandler<F>(F);

#[async_trait]
impl<F, Fut> WebhookHandler for FnWebhookHandler<F>
where
    F: Fn(WebhookHandlerContext) -> Fut + Send + Sync,
    Fut: Future<Output = UdlResult<()>> + Send,
{
    async fn handle(&self, ctx: WebhookHandlerContext) -> UdlResult<()> {
        (self.0)(ctx).await
    }
}

/// Wrap an async closure as a [`WebhookHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn WebhookHandler>
where
    F: Fn(WebhookHandlerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = UdlResult<()>> + Send + 'static,
{
    Arc::new(FnWebhookHandler(f))
}

/// One webhook registration: the path under the plugin's namespace, the
/// handler, and an optional signature verifier.
#[derive(Clone)]
pub struct WebhookRegistration {
    /// Path below `/_webhooks/<plugin>/`.
    pub path: String,
    /// The handler invoked per delivery.
    pub handler: Arc<dyn WebhookHandler>,
    /// Optional authenticity check; `false` rejects with 401.
    pub verify_signature: Option<SignatureVerifier>,
}

impl WebhookRegistration {
    /// A registration without signature verification.
    pub fn new(path: impl Into<String>, handler: Arc<dyn WebhookHandler>) -> Self {
        Self {
            path: normalize_path(&path.into()),
            handler,
            verify_signature: None,
        }
    }

    /// Attach a signature verifier.
    pub fn with_signature<F>(mut self, verify: F) -> Self
    where
        F: Fn(&WebhookRequest, &[u8]) -> bool + Send + Sync + 'static,
    {
        self.verify_signature = Some(Arc::new(verify));
        self
    }
}

fn normalize_path(path: &str) -> String {
    path.trim_matches('/').to_string()
}

/// Process-wide registry of webhook handlers.
#[derive(Default)]
pub struct WebhookRegistry {
    registrations: DashMap<(String, String), WebhookRegistration>,
}

impl WebhookRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; a later registration at the same (plugin, path)
    /// replaces the earlier one.
    pub fn register(&self, plugin_name: impl Into<String>, registration: WebhookRegistration) {
        self.registrations
            .insert((plugin_name.into(), registration.path.clone()), registration);
    }

    /// Look up the handler for a plugin and path.
    pub fn lookup(&self, plugin_name: &str, path: &str) -> Option<WebhookRegistration> {
        self.registrations
            .get(&(plugin_name.to_string(), normalize_path(path)))
            .map(|r| r.clone())
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.registrations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_handler() -> Arc<dyn WebhookHandler> {
        handler_fn(|_ctx| async { Ok(()) })
    }

    #[test]
    fn register_and_lookup_normalizes_paths() {
        let registry = WebhookRegistry::new();
        registry.register("shop", WebhookRegistration::new("/orders/", noop_handler()));

        assert!(registry.lookup("shop", "orders").is_some());
        assert!(registry.lookup("shop", "/orders").is_some());
        assert!(registry.lookup("shop", "refunds").is_none());
        assert!(registry.lookup("cms", "orders").is_none());
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let registry = WebhookRegistry::new();
        registry.register("shop", WebhookRegistration::new("orders", noop_handler()));
        registry.register(
            "shop",
            WebhookRegistration::new("orders", noop_handler()).with_signature(|_, _| false),
        );

        let registration = registry.lookup("shop", "orders").unwrap();
        assert!(registration.verify_signature.is_some());
        assert_eq!(registry.len(), 1);
    }
}
