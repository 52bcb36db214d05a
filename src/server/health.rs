/// Liveness and readiness endpoints.
///
/// `GET /health` answers as long as the process is up. `GET /ready` gates
/// on a registry of named checks — the default set covers the node store
/// and the GraphQL upstream — and answers 503 until every check passes.
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use dashmap::DashMap;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::AppState;

/// A single readiness probe.
pub type ReadinessCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Named readiness checks consulted by `GET /ready`.
#[derive(Default)]
pub struct ReadinessChecks {
    checks: DashMap<String, ReadinessCheck>,
}

impl ReadinessChecks {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The default check set: `nodeStore` and `graphql`, both ready.
    pub fn with_defaults() -> Self {
        let checks = Self::new();
        checks.install_defaults();
        checks
    }

    fn install_defaults(&self) {
        self.register("nodeStore", || true);
        self.set_flag("graphql", true);
    }

    /// Register (or replace) a named check.
    pub fn register<F>(&self, name: impl Into<String>, check: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.checks.insert(name.into(), Arc::new(check));
    }

    /// Register a boolean flag check and return the flag for later flips.
    ///
    /// Sources that learn about upstream outages asynchronously hold onto
    /// the returned handle.
    pub fn set_flag(&self, name: impl Into<String>, initial: bool) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(initial));
        let probe = flag.clone();
        self.register(name, move || probe.load(Ordering::SeqCst));
        flag
    }

    /// Evaluate every check. Returns overall readiness plus per-check
    /// results, name-sorted.
    pub fn evaluate(&self) -> (bool, BTreeMap<String, bool>) {
        let results: BTreeMap<String, bool> = self
            .checks
            .iter()
            .map(|entry| (entry.key().clone(), (entry.value())()))
            .collect();
        let ready = results.values().all(|ok| *ok);
        (ready, results)
    }

    /// Drop custom checks and restore the default set.
    pub fn reset_defaults(&self) {
        self.checks.clear();
        self.install_defaults();
    }
}

/// `GET /health` — liveness.
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

/// `GET /ready` — readiness gated on every registered check.
pub async fn ready_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<serde_json::Value>) {
    let (ready, checks) = state.runtime.readiness().evaluate();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = json!({
        "status": if ready { "ready" } else { "not ready" },
        "checks": checks,
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    });
    (status, Json(body))
}
