/// GraphQL endpoint introspection.
///
/// Posts the standard introspection query to an external endpoint and
/// converts the answer into [`TypeDefinition`]s: built-in operation roots
/// and `__`-prefixed types are stripped, `NON_NULL` wrappers become
/// `required`, lists become arrays with inferred element types, named
/// object types become references, and scalars map through a configurable
/// table.
///
/// Results are cached per (endpoint, headers) for a configurable TTL so
/// repeated codegen runs against the same endpoint stay cheap. Requests
/// honor a timeout and can be canceled through an abort registration.
use super::{FieldDefinition, FieldType, TypeDefinition};
use crate::error::{UdlError, UdlResult};
use crate::node::digest_json;
use dashmap::DashMap;
use futures::future::{AbortRegistration, Abortable};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Introspection query covering exactly what the converter consumes.
const INTROSPECTION_QUERY: &str = r#"
query IntrospectionQuery {
  __schema {
    types {
      kind
      name
      description
      fields(includeDeprecated: true) {
        name
        description
        type { ...TypeRef }
      }
    }
  }
}
fragment TypeRef on __Type {
  kind
  name
  ofType {
    kind
    name
    ofType {
      kind
      name
      ofType { kind name }
    }
  }
}
"#;

/// GraphQL operation roots that never become content types.
const OPERATION_ROOTS: &[&str] = &["Query", "Mutation", "Subscription"];

/// Options for an introspection call.
#[derive(Debug, Clone)]
pub struct IntrospectionOptions {
    /// Extra request headers (e.g. auth tokens).
    pub headers: Vec<(String, String)>,
    /// Mappings for custom scalars beyond the built-ins.
    pub scalar_map: HashMap<String, FieldType>,
    /// Hard limit on the request.
    pub timeout: Duration,
    /// Whether to consult and fill the cache.
    pub use_cache: bool,
    /// How long cached schemas stay fresh.
    pub cache_ttl: Duration,
}

impl Default for IntrospectionOptions {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            scalar_map: HashMap::new(),
            timeout: Duration::from_secs(30),
            use_cache: true,
            cache_ttl: Duration::from_secs(300),
        }
    }
}

impl IntrospectionOptions {
    /// Add a request header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Map a custom scalar name to a field type.
    pub fn scalar(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.scalar_map.insert(name.into(), field_type);
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Disable the cache for this call.
    pub fn no_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    /// Set the cache TTL.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }
}

struct CachedSchema {
    fetched_at: Instant,
    types: Vec<TypeDefinition>,
}

/// Introspection client with a per-(endpoint, headers) schema cache.
pub struct IntrospectionClient {
    client: reqwest::Client,
    cache: DashMap<String, CachedSchema>,
}

impl Default for IntrospectionClient {
    fn default() -> Self {
        Self::new()
    }
}

impl IntrospectionClient {
    /// Create a client with a fresh cache.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            cache: DashMap::new(),
        }
    }

    /// Introspect an endpoint, consulting the cache first.
    pub async fn introspect(
        &self,
        endpoint: &str,
        options: &IntrospectionOptions,
    ) -> UdlResult<Vec<TypeDefinition>> {
        let cache_key = Self::cache_key(endpoint, &options.headers);
        if options.use_cache {
            if let Some(cached) = self.cache.get(&cache_key) {
                if cached.fetched_at.elapsed() <= options.cache_ttl {
                    debug!(endpoint, "introspection cache hit");
                    return Ok(cached.types.clone());
                }
            }
        }

        let types = self.fetch(endpoint, options).await?;
        if options.use_cache {
            self.cache.insert(
                cache_key,
                CachedSchema {
                    fetched_at: Instant::now(),
                    types: types.clone(),
                },
            );
        }
        Ok(types)
    }

    /// Introspect with an external cancellation signal.
    ///
    /// Aborting resolves the call with an `Internal` error; the cache is
    /// untouched.
    pub async fn introspect_abortable(
        &self,
        endpoint: &str,
        options: &IntrospectionOptions,
        abort: AbortRegistration,
    ) -> UdlResult<Vec<TypeDefinition>> {
        match Abortable::new(self.introspect(endpoint, options), abort).await {
            Ok(result) => result,
            Err(_aborted) => Err(UdlError::Internal(format!(
                "introspection of {endpoint} was canceled"
            ))),
        }
    }

    /// Drop every cached schema.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn cache_key(endpoint: &str, headers: &[(String, String)]) -> String {
        let mut sorted: Vec<_> = headers.to_vec();
        sorted.sort();
        let headers_hash = digest_json(&json!(sorted));
        format!("{endpoint}#{headers_hash}")
    }

    async fn fetch(
        &self,
        endpoint: &str,
        options: &IntrospectionOptions,
    ) -> UdlResult<Vec<TypeDefinition>> {
        let mut request = self
            .client
            .post(endpoint)
            .json(&json!({ "query": INTROSPECTION_QUERY }));
        for (name, value) in &options.headers {
            request = request.header(name, value);
        }

        let response = tokio::time::timeout(options.timeout, request.send())
            .await
            .map_err(|_| UdlError::Timeout {
                operation: format!("introspection of {endpoint}"),
                limit_ms: options.timeout.as_millis() as u64,
            })?
            .map_err(|e| UdlError::Transport {
                status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UdlError::Transport {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string(),
            });
        }

        let body: IntrospectionResponse =
            tokio::time::timeout(options.timeout, response.json())
                .await
                .map_err(|_| UdlError::Timeout {
                    operation: format!("introspection of {endpoint}"),
                    limit_ms: options.timeout.as_millis() as u64,
                })?
                .map_err(|e| UdlError::Transport {
                    status: 0,
                    message: format!("invalid introspection body: {e}"),
                })?;

        let schema = body
            .data
            .map(|d| d.schema)
            .ok_or_else(|| UdlError::Internal("introspection response carried no data".into()))?;

        Ok(convert_schema(schema, &options.scalar_map))
    }
}

// ── Introspection wire format ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    data: Option<IntrospectionData>,
}

#[derive(Debug, Deserialize)]
struct IntrospectionData {
    #[serde(rename = "__schema")]
    schema: IntrospectionSchema,
}

#[derive(Debug, Deserialize)]
struct IntrospectionSchema {
    types: Vec<IntrospectionType>,
}

#[derive(Debug, Deserialize)]
struct IntrospectionType {
    kind: String,
    name: Option<String>,
    #[serde(default)]
    fields: Option<Vec<IntrospectionField>>,
}

#[derive(Debug, Deserialize)]
struct IntrospectionField {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "type")]
    type_ref: TypeRef,
}

#[derive(Debug, Deserialize)]
struct TypeRef {
    kind: String,
    name: Option<String>,
    #[serde(rename = "ofType", default)]
    of_type: Option<Box<TypeRef>>,
}

// ── Conversion ───────────────────────────────────────────────────────────

fn convert_schema(
    schema: IntrospectionSchema,
    scalars: &HashMap<String, FieldType>,
) -> Vec<TypeDefinition> {
    let mut definitions = Vec::new();
    for ty in schema.types {
        let Some(name) = ty.name else { continue };
        if ty.kind != "OBJECT"
            || name.starts_with("__")
            || OPERATION_ROOTS.contains(&name.as_str())
        {
            continue;
        }
        let mut definition = TypeDefinition::new(&name);
        for field in ty.fields.unwrap_or_default() {
            definition.fields.push(convert_field(&field, scalars));
        }
        definitions.push(definition);
    }
    definitions.sort_by(|a, b| a.name.cmp(&b.name));
    definitions
}

fn convert_field(
    field: &IntrospectionField,
    scalars: &HashMap<String, FieldType>,
) -> FieldDefinition {
    let (mut definition, required) = convert_type_ref(&field.name, &field.type_ref, scalars);
    definition.required = required;
    definition.description = field.description.clone();
    definition
}

/// Recursively convert a GraphQL type reference. `NON_NULL` wrappers turn
/// into the required flag on the unwrapped type.
fn convert_type_ref(
    name: &str,
    type_ref: &TypeRef,
    scalars: &HashMap<String, FieldType>,
) -> (FieldDefinition, bool) {
    match type_ref.kind.as_str() {
        "NON_NULL" => match &type_ref.of_type {
            Some(inner) => {
                let (definition, _) = convert_type_ref(name, inner, scalars);
                (definition, true)
            }
            None => (FieldDefinition::new(name, FieldType::Unknown), true),
        },
        "LIST" => {
            let item = match &type_ref.of_type {
                Some(inner) => convert_type_ref("item", inner, scalars).0,
                None => FieldDefinition::new("item", FieldType::Unknown),
            };
            (FieldDefinition::array(name, item), false)
        }
        "OBJECT" | "INTERFACE" | "UNION" => {
            let mut definition = FieldDefinition::new(name, FieldType::Reference);
            definition.reference_type = type_ref.name.clone();
            (definition, false)
        }
        "ENUM" => (FieldDefinition::new(name, FieldType::String), false),
        "SCALAR" => {
            let field_type = type_ref
                .name
                .as_deref()
                .map(|scalar| scalar_type(scalar, scalars))
                .unwrap_or(FieldType::Unknown);
            (FieldDefinition::new(name, field_type), false)
        }
        _ => (FieldDefinition::new(name, FieldType::Unknown), false),
    }
}

fn scalar_type(name: &str, scalars: &HashMap<String, FieldType>) -> FieldType {
    match name {
        "ID" | "String" => FieldType::String,
        "Int" | "Float" => FieldType::Number,
        "Boolean" => FieldType::Boolean,
        custom => scalars.get(custom).copied().unwrap_or(FieldType::Unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_ref(kind: &str, name: Option<&str>, of_type: Option<TypeRef>) -> TypeRef {
        TypeRef {
            kind: kind.into(),
            name: name.map(str::to_string),
            of_type: of_type.map(Box::new),
        }
    }

    #[test]
    fn non_null_scalar_is_required() {
        let r = type_ref("NON_NULL", None, Some(type_ref("SCALAR", Some("String"), None)));
        let (definition, required) = convert_type_ref("title", &r, &HashMap::new());
        assert!(required);
        assert_eq!(definition.field_type, FieldType::String);
    }

    #[test]
    fn list_of_objects_becomes_reference_array() {
        let r = type_ref(
            "LIST",
            None,
            Some(type_ref("OBJECT", Some("Variant"), None)),
        );
        let (definition, required) = convert_type_ref("variants", &r, &HashMap::new());
        assert!(!required);
        assert_eq!(definition.field_type, FieldType::Array);
        let item = definition.array_item_type.unwrap();
        assert_eq!(item.field_type, FieldType::Reference);
        assert_eq!(item.reference_type.as_deref(), Some("Variant"));
    }

    #[test]
    fn custom_scalars_use_the_configured_table() {
        let mut scalars = HashMap::new();
        scalars.insert("DateTime".to_string(), FieldType::String);

        let known = type_ref("SCALAR", Some("DateTime"), None);
        assert_eq!(
            convert_type_ref("at", &known, &scalars).0.field_type,
            FieldType::String
        );

        let unknown = type_ref("SCALAR", Some("JSON"), None);
        assert_eq!(
            convert_type_ref("blob", &unknown, &scalars).0.field_type,
            FieldType::Unknown
        );
    }

    #[test]
    fn operation_roots_and_dunder_types_are_stripped() {
        let schema = IntrospectionSchema {
            types: vec![
                IntrospectionType {
                    kind: "OBJECT".into(),
                    name: Some("Query".into()),
                    fields: Some(vec![]),
                },
                IntrospectionType {
                    kind: "OBJECT".into(),
                    name: Some("__Type".into()),
                    fields: Some(vec![]),
                },
                IntrospectionType {
                    kind: "OBJECT".into(),
                    name: Some("Product".into()),
                    fields: Some(vec![IntrospectionField {
                        name: "id".into(),
                        description: None,
                        type_ref: type_ref(
                            "NON_NULL",
                            None,
                            Some(type_ref("SCALAR", Some("ID"), None)),
                        ),
                    }]),
                },
                IntrospectionType {
                    kind: "SCALAR".into(),
                    name: Some("DateTime".into()),
                    fields: None,
                },
            ],
        };

        let definitions = convert_schema(schema, &HashMap::new());
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].name, "Product");
        assert!(definitions[0].fields[0].required);
    }

    #[test]
    fn cache_key_ignores_header_order() {
        let a = IntrospectionClient::cache_key(
            "http://x/graphql",
            &[("a".into(), "1".into()), ("b".into(), "2".into())],
        );
        let b = IntrospectionClient::cache_key(
            "http://x/graphql",
            &[("b".into(), "2".into()), ("a".into(), "1".into())],
        );
        assert_eq!(a, b);
    }
}
