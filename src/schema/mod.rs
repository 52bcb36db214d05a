/// Schema descriptors for observed and declared content types.
///
/// All four inference modes — GraphQL introspection, JSON samples, the live
/// store, and the declarative builder — produce the same
/// [`TypeDefinition`]/[`FieldDefinition`] shapes, so downstream codegen
/// never cares where a schema came from.
pub mod infer;
pub mod introspection;
pub mod merge;
pub mod overrides;

pub use infer::{infer_json_sample, infer_node, infer_store, infer_value, InferOptions};
pub use introspection::{IntrospectionClient, IntrospectionOptions};
pub use merge::{merge_fields, merge_type_definitions};
pub use overrides::SchemaOverrides;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The type of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 text.
    String,
    /// Integer or float.
    Number,
    /// True/false.
    Boolean,
    /// Always null.
    Null,
    /// Not yet determined, or conflicting observations.
    Unknown,
    /// Homogeneous list; see `array_item_type`.
    Array,
    /// Nested object; see `object_fields`.
    Object,
    /// Cross-type reference; see `reference_type`.
    Reference,
}

/// Description of one field of a content type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    /// Field name as it appears on nodes.
    pub name: String,
    /// The field's type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether every observed node carries the field.
    pub required: bool,
    /// Human-readable description (from GraphQL or overrides).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Element type for `Array` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_item_type: Option<Box<FieldDefinition>>,
    /// Known fields for `Object` fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub object_fields: Vec<FieldDefinition>,
    /// Target type name for `Reference` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_type: Option<String>,
    /// Literal values when the field is a closed union.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub literal_values: Vec<JsonValue>,
}

impl FieldDefinition {
    /// A required field of the given type.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            description: None,
            array_item_type: None,
            object_fields: Vec::new(),
            reference_type: None,
            literal_values: Vec::new(),
        }
    }

    /// A required string field.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    /// A required number field.
    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Number)
    }

    /// A required boolean field.
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    /// A required array field with the given element type.
    pub fn array(name: impl Into<String>, item: FieldDefinition) -> Self {
        let mut field = Self::new(name, FieldType::Array);
        field.array_item_type = Some(Box::new(item));
        field
    }

    /// A required object field with the given known fields.
    pub fn object(name: impl Into<String>, fields: Vec<FieldDefinition>) -> Self {
        let mut field = Self::new(name, FieldType::Object);
        field.object_fields = fields;
        field
    }

    /// A required reference field to the named type.
    pub fn reference(name: impl Into<String>, target: impl Into<String>) -> Self {
        let mut field = Self::new(name, FieldType::Reference);
        field.reference_type = Some(target.into());
        field
    }

    /// Mark the field optional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Attach a description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Restrict the field to a closed set of literal values.
    pub fn literals(mut self, values: Vec<JsonValue>) -> Self {
        self.literal_values = values;
        self
    }
}

/// Description of a content type: its fields plus provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDefinition {
    /// The content type name.
    pub name: String,
    /// Producing plugin, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// The type's fields.
    pub fields: Vec<FieldDefinition>,
    /// Registered field-index names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<String>,
}

impl TypeDefinition {
    /// An empty type definition. Chain [`Self::field`] calls to build one
    /// declaratively.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: None,
            fields: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Set the owning plugin.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Append a field.
    pub fn field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    /// Declare a field index.
    pub fn index(mut self, field: impl Into<String>) -> Self {
        self.indexes.push(field.into());
        self
    }

    /// Look up a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_produces_expected_shape() {
        let def = TypeDefinition::new("Product")
            .with_owner("source-shop")
            .field(FieldDefinition::string("title"))
            .field(FieldDefinition::number("price").optional())
            .field(FieldDefinition::reference("collection", "Collection"))
            .index("slug");

        assert_eq!(def.name, "Product");
        assert_eq!(def.fields.len(), 3);
        assert!(def.get_field("title").unwrap().required);
        assert!(!def.get_field("price").unwrap().required);
        assert_eq!(
            def.get_field("collection").unwrap().reference_type.as_deref(),
            Some("Collection")
        );
        assert_eq!(def.indexes, vec!["slug"]);
    }

    #[test]
    fn field_serializes_with_spec_field_names() {
        let field = FieldDefinition::array("tags", FieldDefinition::string("item"))
            .optional()
            .literals(vec![json!("a"), json!("b")]);
        let value = serde_json::to_value(&field).unwrap();

        assert_eq!(value["type"], json!("array"));
        assert_eq!(value["required"], json!(false));
        assert_eq!(value["arrayItemType"]["type"], json!("string"));
        assert_eq!(value["literalValues"], json!(["a", "b"]));
    }
}
