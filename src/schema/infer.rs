/// Schema inference from JSON samples and the live store.
///
/// Walks value trees and turns them into [`FieldDefinition`]s: primitives
/// map to the matching scalar, arrays take their first element's type
/// (empty arrays stay unknown), objects recurse. When a reference registry
/// is supplied, values claimed by a resolver are labeled `reference`
/// instead of being walked.
///
/// Store inference samples nodes per type and folds the per-node shapes
/// with the merge rules, so a field missing from any sampled node comes out
/// optional.
use super::{merge_type_definitions, FieldDefinition, FieldType, TypeDefinition};
use crate::node::{Node, RESERVED_FIELDS};
use crate::references::ReferenceRegistry;
use crate::store::NodeStore;
use serde_json::Value as JsonValue;

/// Options for [`infer_store`].
#[derive(Debug, Clone, Default)]
pub struct InferOptions {
    /// Restrict inference to these content types; empty means all.
    pub types: Vec<String>,
    /// Restrict inference to nodes from these owners; empty means all.
    pub owners: Vec<String>,
    /// Sample at most this many nodes per type; `None` samples all.
    pub sample_size: Option<usize>,
}

/// Infer the field descriptor for a single value.
pub fn infer_value(
    name: &str,
    value: &JsonValue,
    references: Option<&ReferenceRegistry>,
) -> FieldDefinition {
    if let Some(registry) = references {
        if let Some(resolved) = registry.resolve(value) {
            let mut field = FieldDefinition::new(name, FieldType::Reference);
            field.reference_type = resolved.possible_types.first().cloned();
            return field;
        }
    }

    match value {
        JsonValue::String(_) => FieldDefinition::new(name, FieldType::String),
        JsonValue::Number(_) => FieldDefinition::new(name, FieldType::Number),
        JsonValue::Bool(_) => FieldDefinition::new(name, FieldType::Boolean),
        JsonValue::Null => FieldDefinition::new(name, FieldType::Null),
        JsonValue::Array(items) => {
            let item = match items.first() {
                Some(first) => infer_value("item", first, references),
                None => FieldDefinition::new("item", FieldType::Unknown),
            };
            FieldDefinition::array(name, item)
        }
        JsonValue::Object(fields) => {
            let object_fields = fields
                .iter()
                .map(|(key, nested)| infer_value(key, nested, references))
                .collect();
            FieldDefinition::object(name, object_fields)
        }
    }
}

/// Infer a type definition from one sample JSON document.
///
/// The sample must be an object; its top-level keys become the type's
/// fields. Non-object samples yield an empty definition.
pub fn infer_json_sample(
    type_name: &str,
    sample: &JsonValue,
    references: Option<&ReferenceRegistry>,
) -> TypeDefinition {
    let mut definition = TypeDefinition::new(type_name);
    if let JsonValue::Object(fields) = sample {
        definition.fields = fields
            .iter()
            .map(|(key, value)| infer_value(key, value, references))
            .collect();
    }
    definition
}

/// Infer a type definition from one node's user-visible fields.
///
/// Reserved envelope fields never participate.
pub fn infer_node(node: &Node, references: Option<&ReferenceRegistry>) -> TypeDefinition {
    let mut definition =
        TypeDefinition::new(&node.internal.node_type).with_owner(&node.internal.owner);
    definition.fields = node
        .fields
        .iter()
        .filter(|(key, _)| !RESERVED_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| infer_value(key, value, references))
        .collect();
    definition
}

/// Infer definitions for every (matching) type in the live store.
///
/// Per type, up to `sample_size` nodes are inferred individually and folded
/// with the merge rules. Registered field indexes are carried onto the
/// resulting definition.
pub fn infer_store(
    store: &NodeStore,
    references: Option<&ReferenceRegistry>,
    options: &InferOptions,
) -> Vec<TypeDefinition> {
    let mut definitions = Vec::new();

    for node_type in store.get_types() {
        if !options.types.is_empty() && !options.types.contains(&node_type) {
            continue;
        }
        let mut nodes = store.get_by_type(&node_type);
        if !options.owners.is_empty() {
            nodes.retain(|n| options.owners.contains(&n.internal.owner));
        }
        if nodes.is_empty() {
            continue;
        }
        nodes.sort_by(|a, b| a.internal.id.cmp(&b.internal.id));
        if let Some(limit) = options.sample_size {
            nodes.truncate(limit);
        }

        let mut samples = nodes.iter().map(|n| infer_node(n, references));
        let first = samples.next().expect("at least one sample");
        let mut merged = samples.fold(first, |acc, next| merge_type_definitions(&acc, &next));
        merged.fields.sort_by(|a, b| a.name.cmp(&b.name));
        merged.indexes = store.get_registered_indexes(&node_type);
        definitions.push(merged);
    }

    definitions.sort_by(|a, b| a.name.cmp(&b.name));
    definitions
}
