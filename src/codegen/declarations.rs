/// TypeScript type-declaration emitter.
///
/// Turns [`TypeDefinition`]s into `interface` (or `type` alias) declarations
/// for the downstream web application. Mapping rules:
///
/// - scalars map directly; `unknown` stays `unknown`
/// - arrays emit `T[]`, switching to `Array<T>` when `T` itself contains
///   braces or unions (where the suffix form fails to parse as intended)
/// - objects with known fields inline a structural type, otherwise
///   `Record<string, unknown>`
/// - references name the target type when known
/// - literal sets emit a union of literals
///
/// Field names that are not valid identifiers are emitted string-keyed, and
/// optional fields take a trailing `?`.
use crate::schema::{FieldDefinition, FieldType, TypeDefinition};
use regex::Regex;
use std::fmt::Write as _;
use std::sync::OnceLock;

/// Options controlling the emitted declarations.
#[derive(Debug, Clone)]
pub struct DeclarationOptions {
    /// Emit `type X = {...}` instead of `interface X {...}`.
    pub export_type: bool,
    /// Append the generic `internal` descriptor field to every type.
    pub internal_field: bool,
    /// Emit field descriptions as JSDoc comments.
    pub jsdoc: bool,
}

impl Default for DeclarationOptions {
    fn default() -> Self {
        Self {
            export_type: false,
            internal_field: true,
            jsdoc: true,
        }
    }
}

/// Banner prefixed to every generated file.
pub const GENERATED_BANNER: &str = "/* eslint-disable */\n// Generated by udl-codegen. Do not edit by hand.\n";

/// The descriptor interface appended when `internal_field` is on.
const NODE_INTERNAL_DECLARATION: &str = "\
export interface NodeInternal<TType extends string = string, TOwner extends string = string> {
  id: string;
  type: TType;
  owner: TOwner;
  contentDigest: string;
  createdAt: number;
  modifiedAt: number;
}
";

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("valid regex"))
}

/// Emit declarations for a set of types as one file.
pub fn emit_type_declarations(types: &[TypeDefinition], options: &DeclarationOptions) -> String {
    let mut out = String::from(GENERATED_BANNER);
    out.push('\n');
    if options.internal_field {
        out.push_str(NODE_INTERNAL_DECLARATION);
        out.push('\n');
    }

    for (i, definition) in types.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        emit_one(&mut out, definition, options);
    }
    out
}

fn emit_one(out: &mut String, definition: &TypeDefinition, options: &DeclarationOptions) {
    if options.export_type {
        let _ = writeln!(out, "export type {} = {{", definition.name);
    } else {
        let _ = writeln!(out, "export interface {} {{", definition.name);
    }

    if options.internal_field {
        let descriptor = match &definition.owner {
            Some(owner) => format!("NodeInternal<\"{}\", \"{}\">", definition.name, owner),
            None => format!("NodeInternal<\"{}\">", definition.name),
        };
        let _ = writeln!(out, "  internal: {descriptor};");
    }

    for field in &definition.fields {
        if options.jsdoc {
            if let Some(description) = &field.description {
                let _ = writeln!(out, "  /** {} */", description.replace("*/", "*\\/"));
            }
        }
        let key = field_key(&field.name);
        let marker = if field.required { "" } else { "?" };
        let _ = writeln!(out, "  {key}{marker}: {};", ts_type(field));
    }

    if options.export_type {
        out.push_str("};\n");
    } else {
        out.push_str("}\n");
    }
}

/// Quote a field name unless it is a plain identifier.
pub fn field_key(name: &str) -> String {
    if identifier_pattern().is_match(name) {
        name.to_string()
    } else {
        serde_json::Value::String(name.to_string()).to_string()
    }
}

/// The TypeScript type expression for a field.
pub fn ts_type(field: &FieldDefinition) -> String {
    if !field.literal_values.is_empty() {
        return field
            .literal_values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" | ");
    }

    match field.field_type {
        FieldType::String => "string".into(),
        FieldType::Number => "number".into(),
        FieldType::Boolean => "boolean".into(),
        FieldType::Null => "null".into(),
        FieldType::Unknown => "unknown".into(),
        FieldType::Reference => field
            .reference_type
            .clone()
            .unwrap_or_else(|| "unknown".into()),
        FieldType::Array => {
            let inner = field
                .array_item_type
                .as_deref()
                .map(ts_type)
                .unwrap_or_else(|| "unknown".into());
            if inner.contains('{') || inner.contains('|') {
                format!("Array<{inner}>")
            } else {
                format!("{inner}[]")
            }
        }
        FieldType::Object => {
            if field.object_fields.is_empty() {
                "Record<string, unknown>".into()
            } else {
                let members: Vec<String> = field
                    .object_fields
                    .iter()
                    .map(|f| {
                        let marker = if f.required { "" } else { "?" };
                        format!("{}{}: {}", field_key(&f.name), marker, ts_type(f))
                    })
                    .collect();
                format!("{{ {} }}", members.join("; "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_and_optionals() {
        let definition = TypeDefinition::new("Product")
            .field(FieldDefinition::string("title"))
            .field(FieldDefinition::number("price").optional());
        let out = emit_type_declarations(&[definition], &DeclarationOptions::default());

        assert!(out.contains("export interface Product {"));
        assert!(out.contains("  title: string;"));
        assert!(out.contains("  price?: number;"));
        assert!(out.contains("internal: NodeInternal<\"Product\">;"));
    }

    #[test]
    fn arrays_switch_to_generic_form_for_complex_items() {
        let plain = FieldDefinition::array("tags", FieldDefinition::string("item"));
        assert_eq!(ts_type(&plain), "string[]");

        let complex = FieldDefinition::array(
            "variants",
            FieldDefinition::object("item", vec![FieldDefinition::string("sku")]),
        );
        assert_eq!(ts_type(&complex), "Array<{ sku: string }>");

        let union_items = FieldDefinition::array(
            "sizes",
            FieldDefinition::string("item").literals(vec![json!("s"), json!("m")]),
        );
        assert_eq!(ts_type(&union_items), "Array<\"s\" | \"m\">");
    }

    #[test]
    fn objects_inline_or_fall_back_to_record() {
        let empty = FieldDefinition::object("meta", vec![]);
        assert_eq!(ts_type(&empty), "Record<string, unknown>");

        let known = FieldDefinition::object(
            "meta",
            vec![FieldDefinition::string("a"), FieldDefinition::number("b").optional()],
        );
        assert_eq!(ts_type(&known), "{ a: string; b?: number }");
    }

    #[test]
    fn references_and_literals() {
        let reference = FieldDefinition::reference("collection", "Collection");
        assert_eq!(ts_type(&reference), "Collection");

        let dangling = FieldDefinition::new("mystery", FieldType::Reference);
        assert_eq!(ts_type(&dangling), "unknown");

        let status =
            FieldDefinition::string("status").literals(vec![json!("draft"), json!("live")]);
        assert_eq!(ts_type(&status), "\"draft\" | \"live\"");
    }

    #[test]
    fn awkward_field_names_are_quoted() {
        assert_eq!(field_key("title"), "title");
        assert_eq!(field_key("og:image"), "\"og:image\"");
        assert_eq!(field_key("1st"), "\"1st\"");
        assert_eq!(field_key("with space"), "\"with space\"");
    }

    #[test]
    fn export_type_mode_and_owner_descriptor() {
        let definition = TypeDefinition::new("Product")
            .with_owner("source-shop")
            .field(FieldDefinition::string("title"));
        let options = DeclarationOptions {
            export_type: true,
            ..Default::default()
        };
        let out = emit_type_declarations(&[definition], &options);

        assert!(out.contains("export type Product = {"));
        assert!(out.contains("internal: NodeInternal<\"Product\", \"source-shop\">;"));
        assert!(out.contains("};"));
    }

    #[test]
    fn jsdoc_can_be_disabled() {
        let definition = TypeDefinition::new("Product")
            .field(FieldDefinition::string("title").describe("Display title"));

        let with = emit_type_declarations(&[definition.clone()], &DeclarationOptions::default());
        assert!(with.contains("/** Display title */"));

        let without = emit_type_declarations(
            &[definition],
            &DeclarationOptions {
                jsdoc: false,
                ..Default::default()
            },
        );
        assert!(!without.contains("Display title"));
    }
}
