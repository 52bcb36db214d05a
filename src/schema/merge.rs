/// Deterministic merging of field and type descriptors.
///
/// Inference over a sample set sees the same field many times with slightly
/// different shapes; these rules reconcile each pair. The algebra is
/// commutative and associative on compatible inputs, so the result of a
/// fold over samples does not depend on sample order.
use super::{FieldDefinition, FieldType, TypeDefinition};
use std::collections::BTreeMap;

/// Merge two descriptors of the same field.
///
/// - `required` survives only when both sides require the field.
/// - Matching types are kept; a `reference_type` survives only when both
///   sides agree on it.
/// - `null`/`unknown` on one side yields to the other side's type.
/// - Any other mismatch is a conflict and becomes `unknown`.
/// - Array element types and object field sets merge recursively; object
///   fields present on one side only become optional.
pub fn merge_fields(a: &FieldDefinition, b: &FieldDefinition) -> FieldDefinition {
    let required = a.required && b.required;
    let description = a.description.clone().or_else(|| b.description.clone());

    let mut merged = match (a.field_type, b.field_type) {
        (x, y) if x == y => {
            let mut out = FieldDefinition::new(&a.name, x);
            out.reference_type = match (&a.reference_type, &b.reference_type) {
                (Some(ra), Some(rb)) if ra == rb => Some(ra.clone()),
                _ => None,
            };
            out.array_item_type = merge_item_types(&a.array_item_type, &b.array_item_type);
            out.object_fields = merge_field_sets(&a.object_fields, &b.object_fields);
            out.literal_values = merge_literals(a, b);
            out
        }
        // Both indeterminate: the weaker of the two wins.
        (
            FieldType::Null | FieldType::Unknown,
            FieldType::Null | FieldType::Unknown,
        ) => FieldDefinition::new(&a.name, FieldType::Unknown),
        (FieldType::Null | FieldType::Unknown, _) => carry_type(&a.name, b),
        (_, FieldType::Null | FieldType::Unknown) => carry_type(&a.name, a),
        _ => FieldDefinition::new(&a.name, FieldType::Unknown),
    };

    merged.required = required;
    merged.description = description;
    merged
}

/// Take one side's full type information, dropping its required flag and
/// description (handled by the caller).
fn carry_type(name: &str, source: &FieldDefinition) -> FieldDefinition {
    let mut out = FieldDefinition::new(name, source.field_type);
    out.reference_type = source.reference_type.clone();
    out.array_item_type = source.array_item_type.clone();
    out.object_fields = source.object_fields.clone();
    out.literal_values = source.literal_values.clone();
    out
}

fn merge_item_types(
    a: &Option<Box<FieldDefinition>>,
    b: &Option<Box<FieldDefinition>>,
) -> Option<Box<FieldDefinition>> {
    match (a, b) {
        (Some(x), Some(y)) => Some(Box::new(merge_fields(x, y))),
        (Some(x), None) => Some(x.clone()),
        (None, Some(y)) => Some(y.clone()),
        (None, None) => None,
    }
}

/// Union two field sets by name; one-sided fields become optional. The
/// result is name-sorted so merging is order-insensitive.
fn merge_field_sets(a: &[FieldDefinition], b: &[FieldDefinition]) -> Vec<FieldDefinition> {
    let mut by_name: BTreeMap<&str, FieldDefinition> = BTreeMap::new();
    for field in a {
        by_name.insert(&field.name, field.clone());
    }
    for field in b {
        let merged = match by_name.get(field.name.as_str()) {
            Some(existing) => merge_fields(existing, field),
            None => field.clone(),
        };
        by_name.insert(&field.name, merged);
    }
    // Fields seen on only one side are not guaranteed everywhere.
    let b_names: Vec<&str> = b.iter().map(|f| f.name.as_str()).collect();
    by_name
        .into_values()
        .map(|mut field| {
            let in_a = a.iter().any(|f| f.name == field.name);
            let in_b = b_names.contains(&field.name.as_str());
            if !(in_a && in_b) {
                field.required = false;
            }
            field
        })
        .collect()
}

/// Order-insensitive union of literal sets.
fn merge_literals(a: &FieldDefinition, b: &FieldDefinition) -> Vec<serde_json::Value> {
    let mut union: Vec<serde_json::Value> = a.literal_values.clone();
    for value in &b.literal_values {
        if !union.contains(value) {
            union.push(value.clone());
        }
    }
    union.sort_by_key(|v| v.to_string());
    union
}

/// Merge two definitions of the same content type.
///
/// Fields are unioned by name: present on both sides → [`merge_fields`];
/// present on one side → carried over as optional. Indexes are unioned.
pub fn merge_type_definitions(a: &TypeDefinition, b: &TypeDefinition) -> TypeDefinition {
    let mut merged = TypeDefinition::new(&a.name);
    merged.owner = a.owner.clone().or_else(|| b.owner.clone());
    merged.fields = merge_field_sets(&a.fields, &b.fields);

    let mut indexes = a.indexes.clone();
    for index in &b.indexes {
        if !indexes.contains(index) {
            indexes.push(index.clone());
        }
    }
    indexes.sort();
    merged.indexes = indexes;
    merged
}
