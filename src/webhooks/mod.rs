/// Webhook ingestion pipeline.
///
/// Incoming webhooks travel three stages:
///
/// 1. The HTTP handler (see [`crate::server`]) validates the request,
///    verifies its signature, and enqueues a work item — responding 202
///    before any handler runs.
/// 2. The [`WebhookQueue`] debounces and coalesces items into batches.
/// 3. The [`WebhookDispatcher`] looks up the registered handler for each
///    item and runs it with an action context; a failing handler is logged
///    and never aborts its batch.
pub mod dispatcher;
pub mod queue;
pub mod registry;

pub use dispatcher::WebhookDispatcher;
pub use queue::{BatchProcessor, WebhookQueue, WebhookWorkItem};
pub use registry::{
    handler_fn, SignatureVerifier, WebhookHandler, WebhookHandlerContext, WebhookRegistration,
    WebhookRegistry,
};

use serde::{Deserialize, Serialize};

/// The parts of an incoming HTTP request that webhook code may inspect:
/// signature verifiers read headers, handlers occasionally branch on the
/// path. The body travels separately as raw bytes plus parsed JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookRequest {
    /// HTTP method (always POST for accepted requests).
    pub method: String,
    /// Full request path, including the `/_webhooks/` prefix.
    pub path: String,
    /// Request headers, lowercased names.
    pub headers: Vec<(String, String)>,
}

impl WebhookRequest {
    /// First value of a header, by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        let lowered = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k == &lowered)
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let request = WebhookRequest {
            method: "POST".into(),
            path: "/_webhooks/shop/orders".into(),
            headers: vec![("x-signature".into(), "abc".into())],
        };
        assert_eq!(request.header("X-Signature"), Some("abc"));
        assert_eq!(request.header("missing"), None);
    }
}
