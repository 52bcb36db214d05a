/// End-to-end webhook pipeline tests: HTTP intake → debounced queue →
/// dispatcher → handler, against a live server.
use serde_json::{json, Value as JsonValue};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use udl::prelude::*;
use udl::webhooks::{handler_fn, WebhookRegistration};
use udl::{Server, ServerConfig};

/// Scenario: three webhooks in quick succession each get 202 immediately;
/// after the debounce elapses the handler has seen all three, in POST
/// order, as one batch.
#[tokio::test]
async fn rapid_webhooks_coalesce_into_one_ordered_batch() {
    let runtime = Runtime::with_debounce(Duration::from_millis(150));
    let seen: Arc<Mutex<Vec<JsonValue>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    runtime.webhooks().register(
        "shop",
        WebhookRegistration::new(
            "orders",
            handler_fn(move |ctx| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(ctx.body["n"].clone());
                    Ok(())
                }
            }),
        ),
    );
    let handle = Server::new(
        runtime,
        ServerConfig {
            port: 0,
            ..Default::default()
        },
    )
    .bind()
    .await
    .unwrap();

    let client = reqwest::Client::new();
    for n in 1..=3 {
        let response = client
            .post(format!("{}/_webhooks/shop/orders", handle.http_url()))
            .json(&json!({ "n": n }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
        // All three arrive inside one debounce window.
        assert!(seen.lock().unwrap().is_empty());
    }

    sleep(Duration::from_millis(400)).await;
    assert_eq!(*seen.lock().unwrap(), vec![json!(1), json!(2), json!(3)]);

    handle.close().await;
}

/// Handlers write through owner-scoped actions; their nodes land in the
/// store and flow out through sync.
#[tokio::test]
async fn webhook_handlers_write_into_the_graph() {
    let runtime = Runtime::with_debounce(Duration::from_millis(20));
    runtime.webhooks().register(
        "shop",
        WebhookRegistration::new(
            "products",
            handler_fn(|ctx| async move {
                let id = ctx.body["id"].as_str().unwrap_or("unknown").to_string();
                let title = ctx.body["title"].clone();
                udl::create_node(
                    NodeInput::new(id, "Product").field("title", title),
                    &ctx.actions,
                )?;
                Ok(())
            }),
        ),
    );
    let handle = Server::new(
        runtime.clone(),
        ServerConfig {
            port: 0,
            ..Default::default()
        },
    )
    .bind()
    .await
    .unwrap();

    reqwest::Client::new()
        .post(format!("{}/_webhooks/shop/products", handle.http_url()))
        .json(&json!({ "id": "p1", "title": "Widget" }))
        .send()
        .await
        .unwrap();
    sleep(Duration::from_millis(100)).await;

    let node = runtime.store().get("p1").expect("webhook node stored");
    assert_eq!(node.internal.owner, "shop");
    assert_eq!(node.field("title"), Some(&json!("Widget")));

    handle.close().await;
}

/// A handler that fails never surfaces to the HTTP caller and never stops
/// its batch siblings.
#[tokio::test]
async fn failing_handlers_are_isolated() {
    let runtime = Runtime::with_debounce(Duration::from_millis(20));
    let processed: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = processed.clone();
    runtime.webhooks().register(
        "shop",
        WebhookRegistration::new(
            "mixed",
            handler_fn(move |ctx| {
                let sink = sink.clone();
                async move {
                    if ctx.body["boom"] == json!(true) {
                        return Err(UdlError::Internal("handler exploded".into()));
                    }
                    sink.lock().unwrap().push(ctx.body["id"].as_str().unwrap().into());
                    Ok(())
                }
            }),
        ),
    );
    let handle = Server::new(
        runtime,
        ServerConfig {
            port: 0,
            ..Default::default()
        },
    )
    .bind()
    .await
    .unwrap();

    let client = reqwest::Client::new();
    for body in [
        json!({ "id": "first" }),
        json!({ "boom": true }),
        json!({ "id": "last" }),
    ] {
        let response = client
            .post(format!("{}/_webhooks/shop/mixed", handle.http_url()))
            .json(&body)
            .send()
            .await
            .unwrap();
        // The caller always sees 202; failures are observability-only.
        assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
    }

    sleep(Duration::from_millis(120)).await;
    assert_eq!(*processed.lock().unwrap(), vec!["first", "last"]);

    handle.close().await;
}
