/// Typed GraphQL operation documents.
///
/// Discovers named operations in `.graphql`/`.gql` files under the
/// configured roots (skipping hidden entries and `node_modules`), parses
/// them, and emits for each a `Result` type derived from the selection set
/// against the known schema, a `Variables` type derived from the variable
/// definitions, and a constant pairing the document source with both types.
///
/// Anonymous operations are skipped with a warning, as are files that fail
/// to parse; discovery failures never abort a codegen run. The emitted
/// document source is whitespace-normalized, carrying no position metadata.
use super::declarations::GENERATED_BANNER;
use crate::schema::{FieldDefinition, FieldType, TypeDefinition};
use async_graphql_parser::types::{
    BaseType, DocumentOperations, OperationDefinition, OperationType, Selection, SelectionSet,
    Type as GqlType,
};
use async_graphql_parser::Positioned;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Helper interface pairing a document with its types at the type level.
const TYPED_OPERATION_DECLARATION: &str = "\
export interface TypedOperation<TResult, TVariables> {
  kind: \"query\" | \"mutation\" | \"subscription\";
  name: string;
  source: string;
  /** Type-level only; never populated at runtime. */
  __result?: TResult;
  /** Type-level only; never populated at runtime. */
  __variables?: TVariables;
}
";

/// One discovered, successfully parsed named operation.
#[derive(Debug, Clone)]
pub struct DiscoveredOperation {
    /// Operation name.
    pub name: String,
    /// query / mutation / subscription.
    pub kind: &'static str,
    /// Whitespace-normalized source text.
    pub source: String,
    /// File the operation came from.
    pub file: PathBuf,
    variables: Vec<(String, String, bool)>,
    result_type: String,
}

/// Find `.graphql`/`.gql` files under the roots, skipping hidden entries
/// and `node_modules` by name.
pub fn discover_document_files(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for root in roots {
        let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !name.starts_with('.') && name != "node_modules"
        });
        for entry in walker.flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            let matches = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e == "graphql" || e == "gql")
                .unwrap_or(false);
            if matches {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    files
}

/// Parse every discovered file and derive types against the schema.
pub fn discover_operations(
    roots: &[PathBuf],
    schema: &[TypeDefinition],
) -> Vec<DiscoveredOperation> {
    let types: BTreeMap<&str, &TypeDefinition> =
        schema.iter().map(|t| (t.name.as_str(), t)).collect();
    let mut operations = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for file in discover_document_files(roots) {
        let source = match std::fs::read_to_string(&file) {
            Ok(source) => source,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "skipping unreadable document");
                continue;
            }
        };
        let document = match async_graphql_parser::parse_query(&source) {
            Ok(document) => document,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "skipping unparseable document");
                continue;
            }
        };

        match &document.operations {
            DocumentOperations::Single(_) => {
                warn!(
                    file = %file.display(),
                    "skipping anonymous operation; name it to generate types"
                );
            }
            DocumentOperations::Multiple(named) => {
                let mut entries: Vec<(&str, &Positioned<OperationDefinition>)> = named
                    .iter()
                    .map(|(name, operation)| (name.as_str(), operation))
                    .collect();
                entries.sort_by_key(|(name, _)| *name);
                for (name, operation) in entries {
                    if !seen.insert(name.to_string()) {
                        warn!(operation = name, "duplicate operation name; keeping the first");
                        continue;
                    }
                    operations.push(build_operation(
                        name,
                        &operation.node,
                        &source,
                        &file,
                        &types,
                    ));
                }
            }
        }
    }
    operations
}

fn build_operation(
    name: &str,
    operation: &OperationDefinition,
    source: &str,
    file: &Path,
    types: &BTreeMap<&str, &TypeDefinition>,
) -> DiscoveredOperation {
    let kind = match operation.ty {
        OperationType::Query => "query",
        OperationType::Mutation => "mutation",
        OperationType::Subscription => "subscription",
    };

    let variables = operation
        .variable_definitions
        .iter()
        .map(|vd| {
            let var_name = vd.node.name.node.to_string();
            let (ts, required) = variable_ts_type(&vd.node.var_type.node, types);
            (var_name, ts, required)
        })
        .collect();

    let result_type = result_projection(&operation.selection_set, types);

    DiscoveredOperation {
        name: name.to_string(),
        kind,
        source: normalize_source(source),
        file: file.to_path_buf(),
        variables,
        result_type,
    }
}

/// Collapse all whitespace runs; strips newlines and the positions that
/// rode on them.
fn normalize_source(source: &str) -> String {
    source.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// TypeScript type for a GraphQL variable type.
fn variable_ts_type(
    var_type: &GqlType,
    types: &BTreeMap<&str, &TypeDefinition>,
) -> (String, bool) {
    let required = !var_type.nullable;
    let ts = match &var_type.base {
        BaseType::Named(name) => match name.as_str() {
            "ID" | "String" => "string".to_string(),
            "Int" | "Float" => "number".to_string(),
            "Boolean" => "boolean".to_string(),
            other => {
                if types.contains_key(other) {
                    other.to_string()
                } else {
                    "unknown".to_string()
                }
            }
        },
        BaseType::List(inner) => {
            let (inner_ts, _) = variable_ts_type(inner, types);
            if inner_ts.contains('{') || inner_ts.contains('|') {
                format!("Array<{inner_ts}>")
            } else {
                format!("{inner_ts}[]")
            }
        }
    };
    (ts, required)
}

/// Project a root selection set into a structural result type.
///
/// Root fields resolve against the schema by name heuristics (exact type
/// name, capitalized, capitalized singular); a plural match is typed as an
/// array. Unresolvable selections fall back to `unknown`.
fn result_projection(
    selection_set: &Positioned<SelectionSet>,
    types: &BTreeMap<&str, &TypeDefinition>,
) -> String {
    let mut members = Vec::new();
    for item in &selection_set.node.items {
        let Selection::Field(field) = &item.node else {
            continue;
        };
        let field_name = field.node.name.node.as_str();
        let out_name = field
            .node
            .alias
            .as_ref()
            .map(|a| a.node.to_string())
            .unwrap_or_else(|| field_name.to_string());

        let (target, is_list) = resolve_root_type(field_name, types);
        let ts = match target {
            Some(definition) if !field.node.selection_set.node.items.is_empty() => {
                let projected =
                    project_type(definition, &field.node.selection_set, types);
                if is_list {
                    format!("Array<{projected}>")
                } else {
                    format!("{projected} | null")
                }
            }
            _ => "unknown".to_string(),
        };
        members.push(format!("{out_name}: {ts}"));
    }
    if members.is_empty() {
        "Record<string, never>".to_string()
    } else {
        format!("{{ {} }}", members.join("; "))
    }
}

/// Resolve a root field name to a schema type: `product` and `products`
/// both land on `Product`, the latter as a list.
fn resolve_root_type<'a>(
    field_name: &str,
    types: &BTreeMap<&str, &'a TypeDefinition>,
) -> (Option<&'a TypeDefinition>, bool) {
    if let Some(definition) = types.get(field_name) {
        return (Some(definition), false);
    }
    let capitalized = capitalize(field_name);
    if let Some(definition) = types.get(capitalized.as_str()) {
        return (Some(definition), false);
    }
    if let Some(singular) = capitalized.strip_suffix('s') {
        if let Some(definition) = types.get(singular) {
            return (Some(definition), true);
        }
    }
    (None, false)
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Project a selection set against a known type definition.
fn project_type(
    definition: &TypeDefinition,
    selection_set: &Positioned<SelectionSet>,
    types: &BTreeMap<&str, &TypeDefinition>,
) -> String {
    let mut members = Vec::new();
    for item in &selection_set.node.items {
        let Selection::Field(field) = &item.node else {
            continue;
        };
        let field_name = field.node.name.node.as_str();
        let out_name = field
            .node
            .alias
            .as_ref()
            .map(|a| a.node.to_string())
            .unwrap_or_else(|| field_name.to_string());

        if field_name == "__typename" {
            members.push(format!("{out_name}: \"{}\"", definition.name));
            continue;
        }

        let ts = match definition.get_field(field_name) {
            Some(schema_field) => {
                projected_field_type(schema_field, &field.node.selection_set, types)
            }
            None => "unknown".to_string(),
        };
        let marker = definition
            .get_field(field_name)
            .map(|f| if f.required { "" } else { "?" })
            .unwrap_or("");
        members.push(format!("{out_name}{marker}: {ts}"));
    }
    if members.is_empty() {
        "Record<string, never>".to_string()
    } else {
        format!("{{ {} }}", members.join("; "))
    }
}

fn projected_field_type(
    schema_field: &FieldDefinition,
    selection_set: &Positioned<SelectionSet>,
    types: &BTreeMap<&str, &TypeDefinition>,
) -> String {
    match schema_field.field_type {
        FieldType::Reference => {
            let target = schema_field
                .reference_type
                .as_deref()
                .and_then(|name| types.get(name).copied());
            match target {
                Some(definition) if !selection_set.node.items.is_empty() => {
                    project_type(definition, selection_set, types)
                }
                _ => "unknown".to_string(),
            }
        }
        FieldType::Array => {
            let inner = match schema_field.array_item_type.as_deref() {
                Some(item) => projected_field_type(item, selection_set, types),
                None => "unknown".to_string(),
            };
            format!("Array<{inner}>")
        }
        _ => super::declarations::ts_type(schema_field),
    }
}

/// Emit the typed-operations file.
pub fn emit_typed_operations(operations: &[DiscoveredOperation]) -> String {
    let mut out = String::from(GENERATED_BANNER);
    out.push('\n');
    out.push_str(TYPED_OPERATION_DECLARATION);

    for operation in operations {
        out.push('\n');
        let name = &operation.name;
        let _ = writeln!(
            out,
            "export type {name}Result = {};",
            operation.result_type
        );

        if operation.variables.is_empty() {
            let _ = writeln!(out, "export type {name}Variables = Record<string, never>;");
        } else {
            let members: Vec<String> = operation
                .variables
                .iter()
                .map(|(var, ts, required)| {
                    let marker = if *required { "" } else { "?" };
                    format!("{var}{marker}: {ts}")
                })
                .collect();
            let _ = writeln!(
                out,
                "export type {name}Variables = {{ {} }};",
                members.join("; ")
            );
        }

        let source_literal = serde_json::Value::String(operation.source.clone()).to_string();
        let _ = writeln!(out, "export const {name}Document = {{");
        let _ = writeln!(out, "  kind: \"{}\",", operation.kind);
        let _ = writeln!(out, "  name: \"{name}\",");
        let _ = writeln!(out, "  source: {source_literal},");
        let _ = writeln!(
            out,
            "}} as TypedOperation<{name}Result, {name}Variables>;"
        );
    }
    out
}
