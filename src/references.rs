/// Pluggable recognition of cross-type references.
///
/// Sources deliver raw JSON in which certain "marker" objects stand for
/// links to other nodes (`{"__collection": "Collection", "slug": "sale"}`).
/// A [`ReferenceResolver`] teaches the registry to recognize one marker
/// shape: a predicate claims values, a lookup extractor pulls the key used
/// to find the target, and a type extractor names the candidate target
/// types. Schema inference labels claimed values as `reference` fields, and
/// the normalizer uses [`ReferenceRegistry::get_entity_key`] to produce
/// stable `"TypeName:id"` keys.
///
/// Resolvers are consulted in registration order; the first predicate that
/// returns true owns the value.
use serde_json::Value as JsonValue;
use std::sync::{Arc, RwLock};

/// How to derive an entity key from an object value.
#[derive(Debug, Clone)]
pub struct EntityKeyConfig {
    /// Field carrying the type name.
    pub typename_field: String,
    /// Field carrying the id.
    pub id_field: String,
}

impl Default for EntityKeyConfig {
    fn default() -> Self {
        Self {
            typename_field: "__typename".into(),
            id_field: "id".into(),
        }
    }
}

impl EntityKeyConfig {
    /// Apply this config to a value, producing `"TypeName:id"` when both
    /// fields are present.
    fn key_for(&self, value: &JsonValue) -> Option<String> {
        let typename = value.get(&self.typename_field)?.as_str()?;
        let id = entity_id_string(value.get(&self.id_field)?)?;
        Some(format!("{typename}:{id}"))
    }
}

/// Ids may arrive as strings or numbers; both are keyable.
fn entity_id_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

type Predicate = Arc<dyn Fn(&JsonValue) -> bool + Send + Sync>;
type LookupFn = Arc<dyn Fn(&JsonValue) -> Option<String> + Send + Sync>;
type TypesFn = Arc<dyn Fn(&JsonValue) -> Vec<String> + Send + Sync>;

/// Recognizer for one marker shape.
#[derive(Clone)]
pub struct ReferenceResolver {
    /// Unique resolver id, used for unregistration.
    pub id: String,
    /// The field whose presence marks a value as a reference.
    pub marker_field: String,
    /// The field holding the lookup value on the target.
    pub lookup_field: String,
    predicate: Predicate,
    get_lookup_value: LookupFn,
    get_possible_types: TypesFn,
    /// Optional entity-key derivation for claimed values.
    pub entity_key: Option<EntityKeyConfig>,
}

impl std::fmt::Debug for ReferenceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceResolver")
            .field("id", &self.id)
            .field("marker_field", &self.marker_field)
            .field("lookup_field", &self.lookup_field)
            .finish()
    }
}

impl ReferenceResolver {
    /// A marker-field resolver with the common defaults: the predicate
    /// claims objects carrying `marker_field`, the lookup reads
    /// `lookup_field`, and the marker field's value names the target type.
    pub fn marker(
        id: impl Into<String>,
        marker_field: impl Into<String>,
        lookup_field: impl Into<String>,
    ) -> Self {
        let marker_field = marker_field.into();
        let lookup_field = lookup_field.into();
        let marker_for_predicate = marker_field.clone();
        let lookup_for_extract = lookup_field.clone();
        let marker_for_types = marker_field.clone();
        Self {
            id: id.into(),
            marker_field: marker_field.clone(),
            lookup_field,
            predicate: Arc::new(move |v| {
                v.is_object() && v.get(&marker_for_predicate).is_some()
            }),
            get_lookup_value: Arc::new(move |v| {
                v.get(&lookup_for_extract).and_then(entity_id_string)
            }),
            get_possible_types: Arc::new(move |v| {
                v.get(&marker_for_types)
                    .and_then(|t| t.as_str())
                    .map(|t| vec![t.to_string()])
                    .unwrap_or_default()
            }),
            entity_key: None,
        }
    }

    /// Replace the claim predicate.
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&JsonValue) -> bool + Send + Sync + 'static,
    {
        self.predicate = Arc::new(predicate);
        self
    }

    /// Replace the lookup-value extractor.
    pub fn with_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&JsonValue) -> Option<String> + Send + Sync + 'static,
    {
        self.get_lookup_value = Arc::new(lookup);
        self
    }

    /// Replace the possible-types extractor.
    pub fn with_possible_types<F>(mut self, types: F) -> Self
    where
        F: Fn(&JsonValue) -> Vec<String> + Send + Sync + 'static,
    {
        self.get_possible_types = Arc::new(types);
        self
    }

    /// Attach an entity-key derivation.
    pub fn with_entity_key(mut self, config: EntityKeyConfig) -> Self {
        self.entity_key = Some(config);
        self
    }

    /// Whether this resolver claims the value.
    pub fn matches(&self, value: &JsonValue) -> bool {
        (self.predicate)(value)
    }

    /// Lookup value for a claimed reference.
    pub fn lookup_value(&self, value: &JsonValue) -> Option<String> {
        (self.get_lookup_value)(value)
    }

    /// Candidate target types for a claimed reference.
    pub fn possible_types(&self, value: &JsonValue) -> Vec<String> {
        (self.get_possible_types)(value)
    }
}

/// A claimed reference, as reported by [`ReferenceRegistry::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReference {
    /// Id of the resolver that claimed the value.
    pub resolver_id: String,
    /// Candidate target types, in resolver-preferred order.
    pub possible_types: Vec<String>,
    /// The lookup value, when extractable.
    pub lookup_value: Option<String>,
}

/// Process-wide resolver registry.
///
/// Owned by the [`Runtime`](crate::runtime::Runtime) rather than a true
/// global; `clear` restores the pristine state for tests.
#[derive(Default)]
pub struct ReferenceRegistry {
    resolvers: RwLock<Vec<ReferenceResolver>>,
    default_entity_key: RwLock<EntityKeyConfig>,
}

impl ReferenceRegistry {
    /// Create an empty registry with the default `__typename`/`id` entity
    /// key config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resolver; later registrations are consulted later.
    pub fn register_resolver(&self, resolver: ReferenceResolver) {
        self.resolvers
            .write()
            .expect("reference registry poisoned")
            .push(resolver);
    }

    /// Remove a resolver by id. Returns whether one was removed.
    pub fn unregister_resolver(&self, id: &str) -> bool {
        let mut resolvers = self.resolvers.write().expect("reference registry poisoned");
        let before = resolvers.len();
        resolvers.retain(|r| r.id != id);
        resolvers.len() != before
    }

    /// Replace the default entity-key derivation.
    pub fn set_entity_key_config(&self, config: EntityKeyConfig) {
        *self
            .default_entity_key
            .write()
            .expect("reference registry poisoned") = config;
    }

    /// Find the first resolver claiming the value, in registration order.
    pub fn resolve(&self, value: &JsonValue) -> Option<ResolvedReference> {
        let resolvers = self.resolvers.read().expect("reference registry poisoned");
        resolvers.iter().find(|r| r.matches(value)).map(|r| {
            ResolvedReference {
                resolver_id: r.id.clone(),
                possible_types: r.possible_types(value),
                lookup_value: r.lookup_value(value),
            }
        })
    }

    /// Whether any resolver claims the value.
    pub fn is_reference(&self, value: &JsonValue) -> bool {
        self.resolve(value).is_some()
    }

    /// Derive a `"TypeName:id"` entity key for a value.
    ///
    /// The default config applies first (explicit `__typename` plus the
    /// configured id field); otherwise the claiming resolver's entity-key
    /// config is consulted.
    pub fn get_entity_key(&self, value: &JsonValue) -> Option<String> {
        let default = self
            .default_entity_key
            .read()
            .expect("reference registry poisoned");
        if let Some(key) = default.key_for(value) {
            return Some(key);
        }
        drop(default);

        let resolvers = self.resolvers.read().expect("reference registry poisoned");
        resolvers
            .iter()
            .filter(|r| r.matches(value))
            .find_map(|r| r.entity_key.as_ref().and_then(|c| c.key_for(value)))
    }

    /// Number of registered resolvers.
    pub fn len(&self) -> usize {
        self.resolvers
            .read()
            .expect("reference registry poisoned")
            .len()
    }

    /// Whether no resolvers are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every resolver and restore the default entity-key config.
    pub fn clear(&self) {
        self.resolvers
            .write()
            .expect("reference registry poisoned")
            .clear();
        *self
            .default_entity_key
            .write()
            .expect("reference registry poisoned") = EntityKeyConfig::default();
    }
}
