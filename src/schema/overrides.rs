/// Declarative per-type schema overrides.
///
/// Plugins that know their data better than inference does register field
/// overrides here. Reconciliation runs after inference, field by field: an
/// override wins on the type but keeps the observed `required` status, so a
/// field inference saw missing on some nodes stays optional even when a
/// plugin declares it precisely.
use super::{FieldDefinition, TypeDefinition};
use dashmap::DashMap;
use std::collections::HashMap;

/// Registry of `type → (field → declared schema)` overrides.
#[derive(Debug, Default)]
pub struct SchemaOverrides {
    overrides: DashMap<String, HashMap<String, FieldDefinition>>,
}

impl SchemaOverrides {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register overrides for a type; fields merge into any already
    /// registered for the same type, replacing same-named entries.
    pub fn register(&self, type_name: impl Into<String>, fields: Vec<FieldDefinition>) {
        let mut entry = self.overrides.entry(type_name.into()).or_default();
        for field in fields {
            entry.insert(field.name.clone(), field);
        }
    }

    /// Whether a type has any overrides.
    pub fn has_overrides(&self, type_name: &str) -> bool {
        self.overrides.contains_key(type_name)
    }

    /// Reconcile one inferred definition with its overrides.
    ///
    /// Overridden fields keep inference's `required`; fields only the
    /// override knows about are appended as declared.
    pub fn apply_to(&self, inferred: &TypeDefinition) -> TypeDefinition {
        let Some(overrides) = self.overrides.get(&inferred.name) else {
            return inferred.clone();
        };

        let mut result = inferred.clone();
        let mut remaining: HashMap<&str, &FieldDefinition> = overrides
            .iter()
            .map(|(name, field)| (name.as_str(), field))
            .collect();

        for field in &mut result.fields {
            if let Some(declared) = remaining.remove(field.name.as_str()) {
                let observed_required = field.required;
                *field = declared.clone();
                field.required = observed_required;
            }
        }

        let mut appended: Vec<&FieldDefinition> = remaining.into_values().collect();
        appended.sort_by(|a, b| a.name.cmp(&b.name));
        result.fields.extend(appended.into_iter().cloned());
        result
    }

    /// Reconcile a whole inference result.
    pub fn apply(&self, inferred: &[TypeDefinition]) -> Vec<TypeDefinition> {
        inferred.iter().map(|t| self.apply_to(t)).collect()
    }

    /// Drop every registered override.
    pub fn clear(&self) {
        self.overrides.clear();
    }
}
