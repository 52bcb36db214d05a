/// Plugin discovery and lifecycle execution.
///
/// The loader resolves each [`PluginRef`] against the compile-time
/// registry, runs the lifecycle hooks in order, wires nested plugins with
/// bounded recursion, restores and writes per-source caches, and collects
/// codegen contributions.
///
/// Identifier resolution mirrors module resolution:
///
/// 1. `./x` and `../y` resolve relative to the referencing plugin's path
/// 2. a path-style identifier resolves as given (project-local plugin)
/// 3. a bare name resolves as an installed package
///
/// When the registry has no implementation, the loader probes the resolved
/// directory for a declarative manifest (`dist/udl.config.{json,toml}`
/// first, then the source-level file) and loads it as a hook-less plugin.
/// A plugin that fails to resolve or whose hook errors is warned about and
/// skipped; one bad plugin never aborts startup.
use super::cache::{SourceCache, CACHE_DIR_NAME};
use super::{Plugin, PluginConfig, PluginContext, PluginRef, PluginRegistry};
use crate::codegen::CodegenConfig;
#[cfg(test)]
use crate::error::UdlResult;
use crate::runtime::Runtime;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maximum nesting depth for `config.plugins` recursion.
pub const MAX_PLUGIN_DEPTH: usize = 10;

/// One successfully loaded plugin.
#[derive(Debug, Clone)]
pub struct LoadedPlugin {
    /// The plugin's declared name.
    pub name: String,
    /// The identifier it resolved under.
    pub path: String,
    /// Nesting depth (top-level plugins are 0).
    pub depth: usize,
}

/// Codegen contribution collected from one plugin.
#[derive(Debug, Clone)]
pub struct CodegenEntry {
    /// The contributing plugin's name.
    pub plugin_name: String,
    /// Its codegen block.
    pub config: CodegenConfig,
}

/// Result of a top-level load.
#[derive(Debug, Default)]
pub struct LoadResult {
    /// Every plugin that completed its lifecycle, in load order.
    pub plugins: Vec<LoadedPlugin>,
    /// Codegen blocks, in load order.
    pub codegen: Vec<CodegenEntry>,
}

/// A plugin defined only by an on-disk manifest; every hook is a no-op.
struct ManifestPlugin {
    config: PluginConfig,
}

#[async_trait]
impl Plugin for ManifestPlugin {
    fn config(&self) -> PluginConfig {
        self.config.clone()
    }
}

/// The loader.
pub struct PluginLoader {
    runtime: Runtime,
    registry: PluginRegistry,
    project_root: PathBuf,
}

impl PluginLoader {
    /// Create a loader over a runtime, registry, and project root.
    pub fn new(runtime: Runtime, registry: PluginRegistry, project_root: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            registry,
            project_root: project_root.into(),
        }
    }

    /// Load a list of top-level plugin references.
    pub async fn load_all(&self, refs: &[PluginRef]) -> LoadResult {
        let mut result = LoadResult::default();
        for plugin_ref in refs {
            self.load_one(plugin_ref, None, 0, &mut result).await;
        }
        info!(
            plugins = result.plugins.len(),
            codegen = result.codegen.len(),
            "plugin load complete"
        );
        result
    }

    async fn load_one(
        &self,
        plugin_ref: &PluginRef,
        parent: Option<&LoadedPlugin>,
        depth: usize,
        result: &mut LoadResult,
    ) {
        if depth >= MAX_PLUGIN_DEPTH {
            warn!(
                plugin = plugin_ref.name(),
                depth, "plugin nesting exceeds the depth limit; stopping"
            );
            return;
        }

        let resolved = resolve_identifier(plugin_ref.name(), parent.map(|p| p.path.as_str()));
        let Some(plugin) = self.instantiate(&resolved) else {
            warn!(plugin = %resolved, "plugin not found; skipping");
            return;
        };

        let config = plugin.config();
        let name = if config.name.is_empty() {
            resolved.clone()
        } else {
            config.name.clone()
        };
        let cache_dir = self.cache_dir_for(&resolved, parent.map(|p| p.path.as_str()));
        let ctx = PluginContext {
            runtime: self.runtime.clone(),
            actions: self.runtime.action_context_for(&name),
            options: plugin_ref.options(),
            plugin_path: resolved.clone(),
            cache_dir: Some(cache_dir.clone()),
        };

        debug!(plugin = %name, path = %resolved, depth, "loading plugin");
        if let Err(e) = plugin.on_load(&ctx).await {
            warn!(plugin = %name, error = %e, "on_load failed; skipping plugin");
            return;
        }

        if let Some(resolver) = plugin.reference_resolver() {
            self.runtime.references().register_resolver(resolver);
        }
        if let Some(entity_key) = plugin.entity_key_config() {
            self.runtime.references().set_entity_key_config(entity_key);
        }
        for (node_type, fields) in &config.indexes {
            for field in fields {
                self.runtime.store().register_index(node_type, field);
            }
        }

        match plugin.register_types(&ctx).await {
            Ok(types) => {
                for definition in types {
                    self.runtime
                        .store()
                        .set_type_schema(&definition.name.clone(), definition);
                }
            }
            Err(e) => warn!(plugin = %name, error = %e, "register_types failed"),
        }

        if config.cache {
            let restored = SourceCache::restore(self.runtime.store(), &cache_dir);
            if restored > 0 {
                info!(plugin = %name, nodes = restored, "restored cached nodes");
            }
        }

        if let Err(e) = plugin.source_nodes(&ctx).await {
            warn!(plugin = %name, error = %e, "source_nodes failed");
        } else if config.cache {
            if let Err(e) = SourceCache::write(self.runtime.store(), &cache_dir, &name) {
                warn!(plugin = %name, error = %e, "cache write failed");
            }
        }

        if let Some(codegen) = config.codegen.clone() {
            result.codegen.push(CodegenEntry {
                plugin_name: name.clone(),
                config: codegen,
            });
        }

        let loaded = LoadedPlugin {
            name,
            path: resolved,
            depth,
        };
        result.plugins.push(loaded.clone());

        for child in &config.plugins {
            Box::pin(self.load_one(child, Some(&loaded), depth + 1, result)).await;
        }
    }

    /// Registry lookup with a declarative-manifest fallback.
    fn instantiate(&self, resolved: &str) -> Option<Arc<dyn Plugin>> {
        if let Some(plugin) = self.registry.get(resolved) {
            return Some(plugin);
        }
        self.load_manifest(resolved)
            .map(|config| Arc::new(ManifestPlugin { config }) as Arc<dyn Plugin>)
    }

    /// Probe a plugin directory for a manifest: the compiled form under
    /// `dist/` wins over the source-level file.
    fn load_manifest(&self, resolved: &str) -> Option<PluginConfig> {
        let dir = self.project_root.join(resolved);
        let candidates = [
            dir.join("dist").join("udl.config.json"),
            dir.join("dist").join("udl.config.toml"),
            dir.join("udl.config.json"),
            dir.join("udl.config.toml"),
        ];
        for path in candidates {
            let Ok(raw) = std::fs::read_to_string(&path) else {
                continue;
            };
            let parsed: Result<PluginConfig, String> = if path
                .extension()
                .map(|e| e == "toml")
                .unwrap_or(false)
            {
                toml::from_str(&raw).map_err(|e| e.to_string())
            } else {
                serde_json::from_str(&raw).map_err(|e| e.to_string())
            };
            match parsed {
                Ok(config) => return Some(config),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "manifest failed to load");
                    return None;
                }
            }
        }
        None
    }

    /// Cache directory for a plugin: inside its own directory when it has
    /// one on disk, otherwise under the parent's (or project's) cache tree.
    fn cache_dir_for(&self, resolved: &str, parent_path: Option<&str>) -> PathBuf {
        let own_dir = self.project_root.join(resolved);
        if own_dir.is_dir() {
            return own_dir.join(CACHE_DIR_NAME);
        }
        let base = match parent_path {
            Some(parent) => {
                let parent_dir = self.project_root.join(parent);
                if parent_dir.is_dir() {
                    parent_dir
                } else {
                    self.project_root.clone()
                }
            }
            None => self.project_root.clone(),
        };
        base.join(CACHE_DIR_NAME).join(resolved.replace('/', "_"))
    }
}

/// Lexically resolve an identifier, folding `./` and `../` segments against
/// the referencing plugin's path.
fn resolve_identifier(identifier: &str, parent_path: Option<&str>) -> String {
    if !identifier.starts_with("./") && !identifier.starts_with("../") {
        return identifier.to_string();
    }
    let base = parent_path.unwrap_or("");
    let mut segments: Vec<&str> = Path::new(base)
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();
    // The identifier is relative to the parent's directory.
    segments.pop();

    for segment in identifier.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            normal => segments.push(normal),
        }
    }
    segments.join("/")
}
