//! # UDL — Universal Data Layer
//!
//! A long-running aggregation server that ingests entities from external
//! content sources, normalizes them into a uniform in-memory graph of typed
//! *nodes*, and exposes that graph to consumers through three surfaces:
//!
//! - **Delta sync** — `GET /_sync?since=…` returns what changed
//! - **Push** — a WebSocket channel broadcasting node lifecycle events
//! - **Codegen** — typed client bindings synthesized from the observed
//!   shape of the data
//!
//! ## Quick start
//!
//! ```ignore
//! use udl::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     udl::init_logging();
//!
//!     let runtime = Runtime::new();
//!     let ctx = runtime.action_context_for("example");
//!     create_node(
//!         NodeInput::new("product-1", "Product").field("title", json!("Widget")),
//!         &ctx,
//!     )?;
//!
//!     let server = Server::new(runtime, ServerConfig::default());
//!     let handle = server.bind().await?;
//!     println!("listening on {}", handle.addr());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! Data flows one way: sources → actions → **store** → change bus →
//! {WebSocket broadcast, sync endpoint, codegen}. Webhooks enter through a
//! debounced, coalescing queue and drive the same actions. Four subsystems
//! carry the weight:
//!
//! 1. **Node store** (`store`) — thread-safe id→node map with type and
//!    field indexes and a deletion log for tombstone sync
//! 2. **Source & webhook pipeline** (`plugins`, `webhooks`) —
//!    plugin-driven ingestion with per-source caching and a path-based
//!    webhook dispatcher
//! 3. **Event & push fabric** (`events`, `server`) — the in-process change
//!    bus, the WebSocket broadcaster, and the delta-sync endpoint
//! 4. **Schema inference & codegen** (`schema`, `codegen`) — GraphQL
//!    introspection, JSON-sample and live-store inference, and typed
//!    client artifact emission
//!
//! ## Thread safety
//!
//! A [`Runtime`] clones cheaply and is shared across tasks; the store is
//! single-writer by convention (the actions layer serializes its own
//! mutations) while readers receive point-in-time node clones.

pub mod actions;
pub mod codegen;
pub mod config;
pub mod deletion_log;
pub mod error;
pub mod events;
pub mod node;
pub mod plugins;
pub mod references;
pub mod runtime;
pub mod schema;
pub mod server;
pub mod store;
pub mod webhooks;
pub mod ws_client;

// Public API exports
pub use actions::{create_node, delete_node, extend_node, ActionContext, DeleteInput, NodeInput};
pub use deletion_log::{DeletionEntry, DeletionLog};
pub use error::{UdlError, UdlResult};
pub use events::{ChangeBus, ChangeKind, NodeChangeEvent};
pub use node::{content_digest, Node, NodeInternal};
pub use references::{EntityKeyConfig, ReferenceRegistry, ReferenceResolver, ResolvedReference};
pub use runtime::Runtime;
pub use store::{NodeStore, StoreStats};

// Schema and codegen exports
pub use codegen::{run_codegen, CodegenConfig, CodegenReport};
pub use schema::{FieldDefinition, FieldType, SchemaOverrides, TypeDefinition};

// Plugin exports
pub use plugins::{Plugin, PluginConfig, PluginContext, PluginLoader, PluginRef, PluginRegistry};

// Server and client exports
pub use server::{Server, ServerConfig, ServerHandle};
pub use ws_client::{WsClient, WsClientConfig};

// Re-export commonly used external types for convenience
pub use chrono::{DateTime, Utc};
pub use serde_json::{json, Value as JsonValue};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use udl::prelude::*;
/// ```
pub mod prelude {
    pub use crate::actions::{create_node, delete_node, extend_node, ActionContext, NodeInput};
    pub use crate::error::{UdlError, UdlResult};
    pub use crate::events::{ChangeKind, NodeChangeEvent};
    pub use crate::node::{Node, NodeInternal};
    pub use crate::runtime::Runtime;
    pub use crate::schema::{FieldDefinition, FieldType, TypeDefinition};
    pub use crate::server::{Server, ServerConfig};
    pub use crate::store::NodeStore;
    pub use chrono::{DateTime, Utc};
    pub use serde_json::{json, Value as JsonValue};
}

// ============================================================================
// Logging and Observability
// ============================================================================

/// Initialize the logging system.
///
/// Call once at application startup; configures the tracing subscriber
/// with an environment filter. The log level is controlled by the
/// `UDL_LOG` environment variable:
///
/// - `UDL_LOG=error` - Only errors
/// - `UDL_LOG=warn` - Errors and warnings
/// - `UDL_LOG=info` - General information (default)
/// - `UDL_LOG=debug` - Debug information
/// - `UDL_LOG=trace` - Verbose tracing
pub fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("UDL_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Initialize logging with a specific level.
pub fn init_logging_with_level(level: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(level);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
