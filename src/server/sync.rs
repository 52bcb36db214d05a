/// Incremental delta-sync endpoint.
///
/// `GET /_sync?since=<ISO-8601>[&types=T1,T2][&limit=N]` returns every node
/// modified in the window `(since, serverTime]` plus the deletion-log
/// entries from the same window. Clients feed the returned `serverTime`
/// back as the next `since`, which closes clock-skew gaps by construction.
///
/// With `limit`, the response is truncated after N nodes (ordered by
/// `modifiedAt`, ties by id) and `serverTime` falls back to the last
/// returned node's `modifiedAt`, so the next page resumes exactly where
/// this one stopped; `hasMore` signals the truncation.
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::deletion_log::DeletionEntry;
use crate::node::Node;

/// Query parameters for `GET /_sync`.
#[derive(Debug, Deserialize)]
pub struct SyncParams {
    /// ISO-8601 cursor; required.
    pub since: Option<String>,
    /// Comma-separated content types to include.
    pub types: Option<String>,
    /// Page size cap.
    pub limit: Option<usize>,
}

/// `GET /_sync` handler.
pub async fn sync_handler(
    State(state): State<AppState>,
    Query(params): Query<SyncParams>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let Some(since_raw) = params.since else {
        return Err(bad_request("Missing required 'since' parameter"));
    };
    let since = DateTime::parse_from_rfc3339(&since_raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| bad_request("Unparseable 'since' timestamp"))?;

    let types: Vec<String> = params
        .types
        .map(|t| {
            t.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let now = Utc::now();
    let since_ms = since.timestamp_millis();
    let now_ms = now.timestamp_millis();

    let mut updated: Vec<Node> = state
        .runtime
        .store()
        .get_all()
        .into_iter()
        .filter(|n| n.internal.modified_at > since_ms && n.internal.modified_at <= now_ms)
        .filter(|n| types.is_empty() || types.iter().any(|t| t == &n.internal.node_type))
        .collect();
    updated.sort_by(|a, b| {
        a.internal
            .modified_at
            .cmp(&b.internal.modified_at)
            .then_with(|| a.internal.id.cmp(&b.internal.id))
    });

    let mut has_more = false;
    let mut server_time = now;
    if let Some(limit) = params.limit {
        if updated.len() > limit {
            updated.truncate(limit);
            has_more = true;
            // Resume point: the last node delivered on this page.
            let last_ms = updated
                .last()
                .map(|n| n.internal.modified_at)
                .unwrap_or(since_ms);
            server_time = DateTime::from_timestamp_millis(last_ms).unwrap_or(now);
        }
    }

    let deleted: Vec<DeletionEntry> = state
        .runtime
        .deletion_log()
        .entries_between(since, server_time, &types);

    Ok(Json(json!({
        "updated": updated,
        "deleted": deleted,
        "serverTime": server_time.to_rfc3339_opts(SecondsFormat::Millis, true),
        "hasMore": has_more,
    })))
}

fn bad_request(message: &str) -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}
