/// Typed-client codegen.
///
/// Synthesizes three artifacts from a schema — type declarations, runtime
/// type guards, and typed GraphQL operation documents — and writes them
/// idempotently into an output directory. The schema can come from any
/// inference mode; codegen does not care.
pub mod declarations;
pub mod guards;
pub mod operations;
pub mod watch;
pub mod writer;

pub use declarations::{emit_type_declarations, DeclarationOptions};
pub use guards::{emit_type_guards, GuardOptions};
pub use operations::{discover_operations, emit_typed_operations, DiscoveredOperation};
pub use writer::{diff_preview, write_if_changed, WriteOutcome};

use crate::error::UdlResult;
use crate::schema::TypeDefinition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

fn default_true() -> bool {
    true
}

/// Codegen configuration, as carried by plugin configs, the project config
/// file, and the CLI (which wins field by field).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CodegenConfig {
    /// GraphQL endpoint to introspect for the schema.
    pub endpoint: Option<String>,
    /// Output directory for generated files.
    pub output: PathBuf,
    /// Emit runtime type guards.
    pub guards: bool,
    /// Append the `internal` descriptor field to every type.
    #[serde(default = "default_true")]
    pub internal_field: bool,
    /// Emit field descriptions as JSDoc.
    #[serde(default = "default_true")]
    pub jsdoc: bool,
    /// Emit `type` aliases instead of `interface`s.
    pub export_type: bool,
    /// Roots searched for `.graphql`/`.gql` operation documents.
    pub document_roots: Vec<PathBuf>,
    /// Delete stale generated files before writing.
    pub clean: bool,
    /// Guard option: check array elements of primitive item types.
    pub array_element_checks: bool,
    /// Guard option: recurse into known nested object fields.
    pub deep_object_checks: bool,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            output: PathBuf::from("./generated"),
            guards: false,
            internal_field: true,
            jsdoc: true,
            export_type: false,
            document_roots: Vec::new(),
            clean: false,
            array_element_checks: false,
            deep_object_checks: false,
        }
    }
}

impl CodegenConfig {
    /// Declaration emitter options from this config.
    pub fn declaration_options(&self) -> DeclarationOptions {
        DeclarationOptions {
            export_type: self.export_type,
            internal_field: self.internal_field,
            jsdoc: self.jsdoc,
        }
    }

    /// Guard emitter options from this config.
    pub fn guard_options(&self) -> GuardOptions {
        GuardOptions {
            array_element_checks: self.array_element_checks,
            deep_object_checks: self.deep_object_checks,
        }
    }
}

/// What one codegen run did.
#[derive(Debug, Default)]
pub struct CodegenReport {
    /// Files written because content changed.
    pub written: Vec<PathBuf>,
    /// Files skipped because content was identical.
    pub unchanged: Vec<PathBuf>,
    /// Stale files removed by `clean`.
    pub removed: Vec<PathBuf>,
    /// Dry-run previews, one per file that would change.
    pub previews: Vec<(PathBuf, String)>,
}

impl CodegenReport {
    /// Whether the run changed nothing on disk.
    pub fn is_noop(&self) -> bool {
        self.written.is_empty() && self.removed.is_empty()
    }
}

/// Run codegen over a schema.
///
/// Emits `types.ts`, optionally `guards.ts`, and — when document roots are
/// configured — `operations.ts` into the output directory. With `dry_run`
/// nothing is written; the report carries diff previews instead.
pub fn run_codegen(
    types: &[TypeDefinition],
    config: &CodegenConfig,
    dry_run: bool,
) -> UdlResult<CodegenReport> {
    let mut report = CodegenReport::default();
    let mut emitted: Vec<(PathBuf, String)> = Vec::new();

    emitted.push((
        config.output.join("types.ts"),
        emit_type_declarations(types, &config.declaration_options()),
    ));
    if config.guards {
        emitted.push((
            config.output.join("guards.ts"),
            emit_type_guards(types, &config.guard_options()),
        ));
    }
    if !config.document_roots.is_empty() {
        let discovered = discover_operations(&config.document_roots, types);
        if discovered.is_empty() {
            warn!("no named operations found under the configured document roots");
        }
        emitted.push((
            config.output.join("operations.ts"),
            emit_typed_operations(&discovered),
        ));
    }

    if dry_run {
        for (path, content) in emitted {
            let preview = diff_preview(&path, &content);
            if !preview.is_empty() {
                report.previews.push((path, preview));
            }
        }
        return Ok(report);
    }

    for (path, content) in &emitted {
        match write_if_changed(path, content)? {
            WriteOutcome::Written => report.written.push(path.clone()),
            WriteOutcome::Unchanged => report.unchanged.push(path.clone()),
        }
    }

    if config.clean {
        report.removed = remove_stale_files(
            &config.output,
            &emitted.iter().map(|(p, _)| p.clone()).collect(),
        )?;
    }

    info!(
        written = report.written.len(),
        unchanged = report.unchanged.len(),
        removed = report.removed.len(),
        "codegen finished"
    );
    Ok(report)
}

/// Delete generated `.ts` files in the output directory that this run did
/// not produce.
fn remove_stale_files(output: &Path, keep: &BTreeSet<PathBuf>) -> UdlResult<Vec<PathBuf>> {
    let mut removed = Vec::new();
    let Ok(entries) = std::fs::read_dir(output) else {
        return Ok(removed);
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_ts = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == "ts")
            .unwrap_or(false);
        if is_ts && !keep.contains(&path) {
            std::fs::remove_file(&path)?;
            removed.push(path);
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDefinition;
    use tempfile::TempDir;

    fn sample_types() -> Vec<TypeDefinition> {
        vec![TypeDefinition::new("Product").field(FieldDefinition::string("title"))]
    }

    fn config_for(dir: &TempDir) -> CodegenConfig {
        CodegenConfig {
            output: dir.path().join("generated"),
            guards: true,
            ..Default::default()
        }
    }

    #[test]
    fn second_run_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let config = config_for(&dir);

        let first = run_codegen(&sample_types(), &config, false).unwrap();
        assert_eq!(first.written.len(), 2);
        assert!(first.unchanged.is_empty());

        let second = run_codegen(&sample_types(), &config, false).unwrap();
        assert!(second.is_noop());
        assert_eq!(second.unchanged.len(), 2);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let config = config_for(&dir);

        let report = run_codegen(&sample_types(), &config, true).unwrap();
        assert!(!report.previews.is_empty());
        assert!(!config.output.exists());
    }

    #[test]
    fn clean_removes_stale_generated_files() {
        let dir = TempDir::new().unwrap();
        let mut config = config_for(&dir);
        config.clean = true;

        std::fs::create_dir_all(&config.output).unwrap();
        std::fs::write(config.output.join("stale.ts"), "export {};").unwrap();
        std::fs::write(config.output.join("notes.md"), "keep me").unwrap();

        let report = run_codegen(&sample_types(), &config, false).unwrap();
        assert_eq!(report.removed.len(), 1);
        assert!(!config.output.join("stale.ts").exists());
        assert!(config.output.join("notes.md").exists());
    }

    #[test]
    fn config_defaults_deserialize_from_empty_object() {
        let config: CodegenConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.output, PathBuf::from("./generated"));
        assert!(config.internal_field);
        assert!(config.jsdoc);
        assert!(!config.guards);
    }
}
