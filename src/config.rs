/// Project configuration discovery.
///
/// A project root holds a `udl.config.{json,toml}` file describing the
/// top-level plugin list, an optional codegen block, and the server bind
/// address. A compiled form under `dist/` takes precedence over the
/// source-level file, mirroring how plugin manifests resolve.
use crate::codegen::CodegenConfig;
use crate::error::{UdlError, UdlResult};
use crate::plugins::PluginRef;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Base name of the config file.
pub const CONFIG_BASENAME: &str = "udl.config";

/// Project-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectConfig {
    /// Top-level plugins to load.
    pub plugins: Vec<PluginRef>,
    /// Project-wide codegen block.
    pub codegen: Option<CodegenConfig>,
    /// Server bind host.
    pub host: Option<String>,
    /// Server bind port.
    pub port: Option<u16>,
}

/// Probe order: compiled forms first, then source-level files.
fn candidates(root: &Path) -> [PathBuf; 4] {
    [
        root.join("dist").join(format!("{CONFIG_BASENAME}.json")),
        root.join("dist").join(format!("{CONFIG_BASENAME}.toml")),
        root.join(format!("{CONFIG_BASENAME}.json")),
        root.join(format!("{CONFIG_BASENAME}.toml")),
    ]
}

/// Find and load the project config under `root`.
///
/// Returns `Ok(None)` when no config file exists; a file that exists but
/// fails to parse is an error (the project asked for configuration and
/// did not get it).
pub fn discover(root: &Path) -> UdlResult<Option<(PathBuf, ProjectConfig)>> {
    for path in candidates(root) {
        if path.is_file() {
            debug!(file = %path.display(), "project config found");
            return Ok(Some((path.clone(), load(&path)?)));
        }
    }
    Ok(None)
}

/// Load a config file by its extension.
pub fn load(path: &Path) -> UdlResult<ProjectConfig> {
    let raw = std::fs::read_to_string(path)?;
    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e == "toml")
        .unwrap_or(false);
    if is_toml {
        toml::from_str(&raw)
            .map_err(|e| UdlError::invalid_input(format!("{}: {e}", path.display())))
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| UdlError::invalid_input(format!("{}: {e}", path.display())))
    }
}
