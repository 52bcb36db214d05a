/// Runtime type-guard emitter.
///
/// For every type `X` this produces `isX(value): value is X` and
/// `assertX(value): asserts value is X`. Required fields are checked with
/// `typeof` / `Array.isArray` / `=== null`; optional fields are checked
/// only when present. Array element checks and deep object recursion are
/// opt-in — guards default to cheap shape checks.
use super::declarations::{field_key, GENERATED_BANNER};
use crate::schema::{FieldDefinition, FieldType, TypeDefinition};
use std::fmt::Write as _;

/// Options controlling guard strictness.
#[derive(Debug, Clone, Default)]
pub struct GuardOptions {
    /// Check array elements when the item type is a checkable primitive.
    pub array_element_checks: bool,
    /// Recurse into known nested object fields.
    pub deep_object_checks: bool,
}

/// Emit guards for a set of types as one file.
pub fn emit_type_guards(types: &[TypeDefinition], options: &GuardOptions) -> String {
    let mut out = String::from(GENERATED_BANNER);
    let names: Vec<&str> = types.iter().map(|t| t.name.as_str()).collect();
    if !names.is_empty() {
        let _ = writeln!(
            out,
            "import type {{ {} }} from \"./types\";\n",
            names.join(", ")
        );
    }

    for (i, definition) in types.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        emit_guard(&mut out, definition, options);
        out.push('\n');
        emit_assert(&mut out, definition);
    }
    out
}

fn emit_guard(out: &mut String, definition: &TypeDefinition, options: &GuardOptions) {
    let name = &definition.name;
    let _ = writeln!(
        out,
        "export function is{name}(value: unknown): value is {name} {{"
    );
    out.push_str("  if (typeof value !== \"object\" || value === null) return false;\n");
    out.push_str("  const obj = value as Record<string, unknown>;\n");

    for field in &definition.fields {
        emit_field_checks(out, "obj", field, options, 1);
    }

    out.push_str("  return true;\n}\n");
}

fn emit_assert(out: &mut String, definition: &TypeDefinition) {
    let name = &definition.name;
    let _ = writeln!(
        out,
        "export function assert{name}(value: unknown): asserts value is {name} {{"
    );
    let _ = writeln!(
        out,
        "  if (!is{name}(value)) throw new TypeError(\"Value is not a {name}\");"
    );
    out.push_str("}\n");
}

/// JS member-access expression for a field, bracketed when the name is not
/// a plain identifier.
fn access(target: &str, name: &str) -> String {
    let key = field_key(name);
    if key.starts_with('"') {
        format!("{target}[{key}]")
    } else {
        format!("{target}.{key}")
    }
}

fn emit_field_checks(
    out: &mut String,
    target: &str,
    field: &FieldDefinition,
    options: &GuardOptions,
    depth: usize,
) {
    let indent = "  ".repeat(depth);
    let expr = access(target, &field.name);
    let Some(condition) = failure_condition(&expr, field, options) else {
        // Unchecked types still require presence when the field is required.
        if field.required {
            let _ = writeln!(out, "{indent}if ({expr} === undefined) return false;");
        }
        return;
    };

    if field.required {
        let _ = writeln!(out, "{indent}if ({condition}) return false;");
    } else {
        let _ = writeln!(
            out,
            "{indent}if ({expr} !== undefined && ({condition})) return false;"
        );
    }

    if options.deep_object_checks
        && field.field_type == FieldType::Object
        && !field.object_fields.is_empty()
    {
        let nested_target = format!("({expr} as Record<string, unknown>)");
        for nested in &field.object_fields {
            emit_field_checks(out, &nested_target, nested, options, depth);
        }
    }
}

/// The condition under which a value fails the field's check, or `None`
/// when the type is not checkable.
fn failure_condition(
    expr: &str,
    field: &FieldDefinition,
    options: &GuardOptions,
) -> Option<String> {
    match field.field_type {
        FieldType::String => Some(format!("typeof {expr} !== \"string\"")),
        FieldType::Number => Some(format!("typeof {expr} !== \"number\"")),
        FieldType::Boolean => Some(format!("typeof {expr} !== \"boolean\"")),
        FieldType::Null => Some(format!("{expr} !== null")),
        FieldType::Array => {
            let mut condition = format!("!Array.isArray({expr})");
            if options.array_element_checks {
                if let Some(check) = field
                    .array_item_type
                    .as_deref()
                    .and_then(primitive_typeof)
                {
                    condition = format!(
                        "{condition} || !({expr} as unknown[]).every((item) => typeof item === \"{check}\")"
                    );
                }
            }
            Some(condition)
        }
        FieldType::Object => Some(format!(
            "typeof {expr} !== \"object\" || {expr} === null"
        )),
        FieldType::Reference | FieldType::Unknown => None,
    }
}

/// `typeof` string for checkable primitive item types.
fn primitive_typeof(field: &FieldDefinition) -> Option<&'static str> {
    match field.field_type {
        FieldType::String => Some("string"),
        FieldType::Number => Some("number"),
        FieldType::Boolean => Some("boolean"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> TypeDefinition {
        TypeDefinition::new("Product")
            .field(FieldDefinition::string("title"))
            .field(FieldDefinition::number("price").optional())
            .field(FieldDefinition::array("tags", FieldDefinition::string("item")))
    }

    #[test]
    fn guards_check_required_and_optional_fields() {
        let out = emit_type_guards(&[product()], &GuardOptions::default());

        assert!(out.contains("export function isProduct(value: unknown): value is Product {"));
        assert!(out.contains("if (typeof obj.title !== \"string\") return false;"));
        assert!(out
            .contains("if (obj.price !== undefined && (typeof obj.price !== \"number\")) return false;"));
        assert!(out.contains("if (!Array.isArray(obj.tags)) return false;"));
        assert!(out.contains("export function assertProduct(value: unknown): asserts value is Product {"));
        assert!(out.contains("import type { Product } from \"./types\";"));
    }

    #[test]
    fn array_element_checks_are_opt_in_and_primitive_only() {
        let options = GuardOptions {
            array_element_checks: true,
            ..Default::default()
        };
        let out = emit_type_guards(&[product()], &options);
        assert!(out.contains("every((item) => typeof item === \"string\")"));

        let references = TypeDefinition::new("Catalog").field(FieldDefinition::array(
            "products",
            FieldDefinition::reference("item", "Product"),
        ));
        let out = emit_type_guards(&[references], &options);
        assert!(!out.contains("every("));
    }

    #[test]
    fn deep_object_checks_recurse_into_known_fields() {
        let definition = TypeDefinition::new("Page").field(FieldDefinition::object(
            "seo",
            vec![FieldDefinition::string("title")],
        ));

        let shallow = emit_type_guards(&[definition.clone()], &GuardOptions::default());
        assert!(!shallow.contains("(obj.seo as Record<string, unknown>)"));

        let deep = emit_type_guards(
            &[definition],
            &GuardOptions {
                deep_object_checks: true,
                ..Default::default()
            },
        );
        assert!(deep.contains("(obj.seo as Record<string, unknown>).title"));
    }

    #[test]
    fn reference_fields_only_require_presence() {
        let definition = TypeDefinition::new("Product")
            .field(FieldDefinition::reference("collection", "Collection"));
        let out = emit_type_guards(&[definition], &GuardOptions::default());
        assert!(out.contains("if (obj.collection === undefined) return false;"));
    }

    #[test]
    fn awkward_names_use_bracket_access() {
        let definition =
            TypeDefinition::new("Page").field(FieldDefinition::string("og:image"));
        let out = emit_type_guards(&[definition], &GuardOptions::default());
        assert!(out.contains("obj[\"og:image\"]"));
    }
}
