/// End-to-end codegen tests: declarations, guards, and typed operations
/// emitted together, idempotently, from a live store's inferred schema.
use serde_json::json;
use std::fs;
use tempfile::TempDir;
use udl::prelude::*;
use udl::schema::{infer_store, InferOptions};
use udl::{run_codegen, CodegenConfig};

fn populated_runtime() -> Runtime {
    let runtime = Runtime::new();
    runtime.store().register_index("Product", "slug");
    let ctx = runtime.action_context_for("source-shop");
    create_node(
        NodeInput::new("p1", "Product")
            .field("title", json!("Widget"))
            .field("slug", json!("widget"))
            .field("price", json!(9.99))
            .field("tags", json!(["a", "b"])),
        &ctx,
    )
    .unwrap();
    create_node(
        NodeInput::new("p2", "Product")
            .field("title", json!("Gadget"))
            .field("slug", json!("gadget")),
        &ctx,
    )
    .unwrap();
    create_node(
        NodeInput::new("c1", "Collection").field("name", json!("Sale")),
        &ctx,
    )
    .unwrap();
    runtime
}

/// Scenario: run codegen twice over the same inputs; the second run writes
/// zero files and reports everything unchanged.
#[tokio::test]
async fn codegen_is_idempotent_over_unchanged_inputs() {
    let runtime = populated_runtime();
    let types = infer_store(runtime.store(), None, &InferOptions::default());

    let dir = TempDir::new().unwrap();
    let docs = dir.path().join("queries");
    fs::create_dir_all(&docs).unwrap();
    fs::write(
        docs.join("get.graphql"),
        "query GetProduct { product { title price } }",
    )
    .unwrap();

    let config = CodegenConfig {
        output: dir.path().join("generated"),
        guards: true,
        document_roots: vec![docs],
        ..Default::default()
    };

    let first = run_codegen(&types, &config, false).unwrap();
    assert_eq!(first.written.len(), 3);
    assert!(first.unchanged.is_empty());

    let second = run_codegen(&types, &config, false).unwrap();
    assert!(second.is_noop());
    assert_eq!(second.unchanged.len(), 3);
}

#[tokio::test]
async fn generated_artifacts_reflect_the_observed_schema() {
    let runtime = populated_runtime();
    let types = infer_store(runtime.store(), None, &InferOptions::default());

    let dir = TempDir::new().unwrap();
    let config = CodegenConfig {
        output: dir.path().to_path_buf(),
        guards: true,
        ..Default::default()
    };
    run_codegen(&types, &config, false).unwrap();

    let declarations = fs::read_to_string(dir.path().join("types.ts")).unwrap();
    // Both sampled types appear, owner-tagged.
    assert!(declarations.contains("export interface Product {"));
    assert!(declarations.contains("export interface Collection {"));
    assert!(declarations.contains("internal: NodeInternal<\"Product\", \"source-shop\">;"));
    // title was on every Product sample; price and tags were not.
    assert!(declarations.contains("  title: string;"));
    assert!(declarations.contains("  price?: number;"));
    assert!(declarations.contains("  tags?: string[];"));

    let guards = fs::read_to_string(dir.path().join("guards.ts")).unwrap();
    assert!(guards.contains("export function isProduct"));
    assert!(guards.contains("export function assertCollection"));
}

#[tokio::test]
async fn schema_changes_rewrite_only_what_changed() {
    let runtime = populated_runtime();
    let dir = TempDir::new().unwrap();
    let config = CodegenConfig {
        output: dir.path().to_path_buf(),
        ..Default::default()
    };

    let types = infer_store(runtime.store(), None, &InferOptions::default());
    run_codegen(&types, &config, false).unwrap();

    // A new field on an existing type changes the schema.
    let ctx = runtime.action_context_for("source-shop");
    create_node(
        NodeInput::new("p3", "Product")
            .field("title", json!("Doohickey"))
            .field("slug", json!("doohickey"))
            .field("weight", json!(1.5)),
        &ctx,
    )
    .unwrap();

    let types = infer_store(runtime.store(), None, &InferOptions::default());
    let report = run_codegen(&types, &config, false).unwrap();
    assert_eq!(report.written.len(), 1);

    let declarations = fs::read_to_string(dir.path().join("types.ts")).unwrap();
    assert!(declarations.contains("weight?: number;"));
}
