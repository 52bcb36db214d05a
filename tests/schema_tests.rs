/// Schema subsystem tests: the field-merge algebra (commutativity and
/// associativity over compatible inputs), override reconciliation, and
/// introspection caching against a counting mock endpoint.
use proptest::prelude::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use udl::schema::{
    infer_json_sample, merge_fields, IntrospectionClient, IntrospectionOptions, SchemaOverrides,
};
use udl::{FieldDefinition, FieldType, TypeDefinition};

// ── Merge algebra ────────────────────────────────────────────────────────

fn scalar_type() -> impl Strategy<Value = FieldType> {
    prop_oneof![
        Just(FieldType::String),
        Just(FieldType::Number),
        Just(FieldType::Boolean),
        Just(FieldType::Null),
        Just(FieldType::Unknown),
    ]
}

/// Simple fields: scalars and references, no descriptions (the
/// prefer-existing description rule is deliberately asymmetric).
fn arb_field() -> impl Strategy<Value = FieldDefinition> {
    let scalar = (scalar_type(), any::<bool>()).prop_map(|(field_type, required)| {
        let mut field = FieldDefinition::new("field", field_type);
        field.required = required;
        field
    });
    let reference = (prop_oneof![Just("Product"), Just("Collection")], any::<bool>()).prop_map(
        |(target, required)| {
            let mut field = FieldDefinition::reference("field", target);
            field.required = required;
            field
        },
    );
    let array = (scalar_type(), any::<bool>()).prop_map(|(item, required)| {
        let mut field = FieldDefinition::array("field", FieldDefinition::new("item", item));
        field.required = required;
        field
    });
    prop_oneof![scalar, reference, array]
}

proptest! {
    #[test]
    fn merge_is_commutative(a in arb_field(), b in arb_field()) {
        prop_assert_eq!(merge_fields(&a, &b), merge_fields(&b, &a));
    }

    #[test]
    fn merge_is_associative(a in arb_field(), b in arb_field(), c in arb_field()) {
        let left = merge_fields(&merge_fields(&a, &b), &c);
        let right = merge_fields(&a, &merge_fields(&b, &c));
        prop_assert_eq!(left, right);
    }

    #[test]
    fn merge_is_idempotent(a in arb_field()) {
        prop_assert_eq!(merge_fields(&a, &a), a);
    }

    #[test]
    fn required_never_appears_from_nowhere(a in arb_field(), b in arb_field()) {
        let merged = merge_fields(&a, &b);
        prop_assert_eq!(merged.required, a.required && b.required);
    }
}

// ── Sample inference + overrides, end to end ─────────────────────────────

#[test]
fn sample_inference_reconciled_with_overrides() {
    let sample = json!({
        "title": "Widget",
        "price": 9.99,
        "tags": ["a", "b"],
        "seo": { "description": "..." },
        "collection": null
    });
    let inferred = infer_json_sample("Product", &sample, None);
    assert_eq!(
        inferred.get_field("tags").unwrap().field_type,
        FieldType::Array
    );
    assert_eq!(
        inferred.get_field("collection").unwrap().field_type,
        FieldType::Null
    );

    let overrides = SchemaOverrides::new();
    overrides.register(
        "Product",
        vec![FieldDefinition::reference("collection", "Collection").optional()],
    );
    let reconciled = overrides.apply_to(&inferred);

    let collection = reconciled.get_field("collection").unwrap();
    assert_eq!(collection.field_type, FieldType::Reference);
    assert_eq!(collection.reference_type.as_deref(), Some("Collection"));
    // Observed required status survives the override.
    assert!(collection.required);
}

// ── Introspection caching ────────────────────────────────────────────────

async fn start_mock_graphql(hits: Arc<AtomicUsize>) -> String {
    use axum::routing::post;

    let app = axum::Router::new().route(
        "/graphql",
        post(move || {
            hits.fetch_add(1, Ordering::SeqCst);
            async move {
                axum::Json(json!({
                    "data": {
                        "__schema": {
                            "types": [
                                {
                                    "kind": "OBJECT",
                                    "name": "Product",
                                    "fields": [
                                        {
                                            "name": "title",
                                            "description": "Display title",
                                            "type": {
                                                "kind": "NON_NULL",
                                                "name": null,
                                                "ofType": { "kind": "SCALAR", "name": "String", "ofType": null }
                                            }
                                        },
                                        {
                                            "name": "variants",
                                            "description": null,
                                            "type": {
                                                "kind": "LIST",
                                                "name": null,
                                                "ofType": { "kind": "OBJECT", "name": "Variant", "ofType": null }
                                            }
                                        }
                                    ]
                                },
                                { "kind": "OBJECT", "name": "Query", "fields": [] },
                                { "kind": "OBJECT", "name": "__Schema", "fields": [] }
                            ]
                        }
                    }
                }))
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/graphql")
}

#[tokio::test]
async fn introspection_converts_and_strips_roots() {
    let hits = Arc::new(AtomicUsize::new(0));
    let endpoint = start_mock_graphql(hits).await;

    let client = IntrospectionClient::new();
    let types = client
        .introspect(&endpoint, &IntrospectionOptions::default())
        .await
        .unwrap();

    assert_eq!(types.len(), 1, "operation roots and __ types stripped");
    let product = &types[0];
    assert_eq!(product.name, "Product");

    let title = product.get_field("title").unwrap();
    assert_eq!(title.field_type, FieldType::String);
    assert!(title.required);
    assert_eq!(title.description.as_deref(), Some("Display title"));

    let variants = product.get_field("variants").unwrap();
    assert_eq!(variants.field_type, FieldType::Array);
    let item = variants.array_item_type.as_deref().unwrap();
    assert_eq!(item.field_type, FieldType::Reference);
    assert_eq!(item.reference_type.as_deref(), Some("Variant"));
}

/// Scenario: a second cached call performs zero HTTP requests; after the
/// TTL lapses the next call fetches again.
#[tokio::test]
async fn introspection_cache_hits_then_expires() {
    let hits = Arc::new(AtomicUsize::new(0));
    let endpoint = start_mock_graphql(hits.clone()).await;

    let client = IntrospectionClient::new();
    let options = IntrospectionOptions::default().cache_ttl(Duration::from_millis(80));

    client.introspect(&endpoint, &options).await.unwrap();
    client.introspect(&endpoint, &options).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1, "second call must be cached");

    tokio::time::sleep(Duration::from_millis(120)).await;
    client.introspect(&endpoint, &options).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2, "stale cache must refetch");

    // Different headers form a different cache key.
    let with_auth = options.clone().header("authorization", "Bearer t");
    client.introspect(&endpoint, &with_auth).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn introspection_failures_surface_transport_errors() {
    let client = IntrospectionClient::new();

    // Nothing listens here.
    let result = client
        .introspect(
            "http://127.0.0.1:9/graphql",
            &IntrospectionOptions::default().timeout(Duration::from_secs(2)),
        )
        .await;
    assert!(matches!(
        result,
        Err(udl::UdlError::Transport { .. }) | Err(udl::UdlError::Timeout { .. })
    ));
}

#[tokio::test]
async fn custom_types_definition_round_trips_through_json() {
    let definition = TypeDefinition::new("Product")
        .with_owner("shop")
        .field(FieldDefinition::string("title").describe("Display title"))
        .field(
            FieldDefinition::string("status").literals(vec![json!("draft"), json!("live")]),
        )
        .index("slug");

    let encoded = serde_json::to_value(&definition).unwrap();
    assert_eq!(encoded["fields"][0]["type"], json!("string"));
    assert_eq!(encoded["indexes"], json!(["slug"]));

    let decoded: TypeDefinition = serde_json::from_value(encoded).unwrap();
    assert_eq!(decoded, definition);
}
