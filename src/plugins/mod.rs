/// Plugin model for content sources.
///
/// A plugin is a compiled implementation of [`Plugin`] registered in a
/// [`PluginRegistry`] under one or more identifiers (a bare package name,
/// or a directory-style path for project-local plugins). Its
/// [`PluginConfig`] mirrors what a config module would export: a name, an
/// optional source type, nested plugins, a codegen block, index
/// declarations, and a cache switch. Hook order per plugin is `on_load` →
/// `register_types` → `source_nodes`; nested plugins load after their
/// parent, receiving the parent's path as a cache-directory hint.
pub mod cache;
pub mod loader;

pub use cache::SourceCache;
pub use loader::{LoadResult, LoadedPlugin, PluginLoader, MAX_PLUGIN_DEPTH};

use crate::actions::ActionContext;
use crate::codegen::CodegenConfig;
use crate::error::UdlResult;
use crate::references::{EntityKeyConfig, ReferenceResolver};
use crate::runtime::Runtime;
use crate::schema::TypeDefinition;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Reference to a plugin from a config: a bare identifier or an
/// identifier-with-options object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PluginRef {
    /// `"udl-source-shopify"`
    Name(String),
    /// `{ "name": "udl-source-shopify", "options": {...} }`
    WithOptions {
        /// Plugin identifier.
        name: String,
        /// Options forwarded to the plugin's `on_load`.
        #[serde(default)]
        options: JsonValue,
    },
}

impl PluginRef {
    /// The plugin identifier.
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::WithOptions { name, .. } => name,
        }
    }

    /// The options payload (`null` for bare references).
    pub fn options(&self) -> JsonValue {
        match self {
            Self::Name(_) => JsonValue::Null,
            Self::WithOptions { options, .. } => options.clone(),
        }
    }
}

impl From<&str> for PluginRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// Static descriptor a plugin exports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginConfig {
    /// Plugin name; becomes the owner of nodes it sources.
    pub name: String,
    /// Optional source kind tag (e.g. "commerce", "cms", "filesystem").
    #[serde(rename = "type")]
    pub plugin_type: Option<String>,
    /// Nested plugins to load after this one.
    pub plugins: Vec<PluginRef>,
    /// Codegen contribution collected by the loader.
    pub codegen: Option<CodegenConfig>,
    /// Field indexes to register: type → field names.
    pub indexes: BTreeMap<String, Vec<String>>,
    /// Whether sourced nodes are snapshotted to a per-plugin cache.
    pub cache: bool,
}

impl PluginConfig {
    /// A minimal config with just a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Context handed to every plugin hook.
#[derive(Clone)]
pub struct PluginContext {
    /// The shared runtime.
    pub runtime: Runtime,
    /// Action context owned by this plugin.
    pub actions: ActionContext,
    /// Options from the referencing config (`null` when none).
    pub options: JsonValue,
    /// The identifier this plugin resolved under.
    pub plugin_path: String,
    /// Directory for this plugin's durable cache, when caching applies.
    pub cache_dir: Option<PathBuf>,
}

/// A content-source plugin.
///
/// All hooks default to no-ops so simple plugins implement only what they
/// need.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// The static descriptor.
    fn config(&self) -> PluginConfig;

    /// Called once at load, before anything else. Webhook registrations
    /// belong here, via `ctx.runtime.webhooks()`.
    async fn on_load(&self, _ctx: &PluginContext) -> UdlResult<()> {
        Ok(())
    }

    /// Declare schemas for the types this plugin produces.
    async fn register_types(&self, _ctx: &PluginContext) -> UdlResult<Vec<TypeDefinition>> {
        Ok(Vec::new())
    }

    /// Produce nodes through `ctx.actions`.
    async fn source_nodes(&self, _ctx: &PluginContext) -> UdlResult<()> {
        Ok(())
    }

    /// A reference resolver to install globally.
    fn reference_resolver(&self) -> Option<ReferenceResolver> {
        None
    }

    /// An entity-key config to install globally.
    fn entity_key_config(&self) -> Option<EntityKeyConfig> {
        None
    }
}

/// Compile-time plugin registry.
///
/// Identifiers follow module-resolution conventions: project-local plugins
/// register under path-style keys (`./plugins/shop`), installed packages
/// under bare names (`udl-source-shopify`). The loader resolves references
/// against these keys.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: Arc<DashMap<String, Arc<dyn Plugin>>>,
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under an identifier.
    pub fn register(&self, identifier: impl Into<String>, plugin: Arc<dyn Plugin>) {
        self.plugins.insert(identifier.into(), plugin);
    }

    /// Look up a plugin by exact identifier.
    pub fn get(&self, identifier: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(identifier).map(|p| p.clone())
    }

    /// Whether an identifier is registered.
    pub fn contains(&self, identifier: &str) -> bool {
        self.plugins.contains_key(identifier)
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plugin_ref_parses_both_forms() {
        let bare: PluginRef = serde_json::from_value(json!("udl-source-shopify")).unwrap();
        assert_eq!(bare.name(), "udl-source-shopify");
        assert!(bare.options().is_null());

        let with_options: PluginRef = serde_json::from_value(json!({
            "name": "udl-source-shopify",
            "options": { "shop": "demo" }
        }))
        .unwrap();
        assert_eq!(with_options.name(), "udl-source-shopify");
        assert_eq!(with_options.options()["shop"], json!("demo"));
    }

    #[test]
    fn plugin_config_deserializes_from_manifest_shape() {
        let config: PluginConfig = serde_json::from_value(json!({
            "name": "source-shop",
            "type": "commerce",
            "plugins": ["./nested"],
            "cache": true,
            "indexes": { "Product": ["slug"] }
        }))
        .unwrap();

        assert_eq!(config.name, "source-shop");
        assert_eq!(config.plugin_type.as_deref(), Some("commerce"));
        assert_eq!(config.plugins.len(), 1);
        assert!(config.cache);
        assert_eq!(config.indexes["Product"], vec!["slug"]);
    }
}
