//! Plugin tools — user-provided commands discovered from TOML manifests.
//!
//! Each manifest in the plugin directory declares one tool: its name,
//! description, parameter schema, and the command to run. On invocation the
//! arguments are passed as a JSON object in the final argv slot and the
//! command's stdout becomes the tool output.
//!
//! Example `~/.sotto/plugins/weather.toml`:
//!
//! ```toml
//! name = "weather_lookup"
//! description = "Get the current weather for a city"
//! command = "/usr/local/bin/weather-cli"
//! args = ["--brief"]
//! timeout_secs = 10
//!
//! [parameters]
//! type = "object"
//! required = ["city"]
//! [parameters.properties.city]
//! type = "string"
//! description = "City name"
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use sotto_core::error::ToolError;
use sotto_core::tool::{Tool, ToolOutput};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A plugin tool manifest, as parsed from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub description: String,
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// JSON Schema for the tool's parameters. TOML tables deserialize
    /// straight into a JSON value here.
    #[serde(default = "empty_schema")]
    pub parameters: serde_json::Value,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn empty_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// A tool backed by an external command from a plugin manifest.
pub struct PluginTool {
    manifest: PluginManifest,
}

impl PluginTool {
    pub fn new(manifest: PluginManifest) -> Self {
        Self { manifest }
    }
}

#[async_trait]
impl Tool for PluginTool {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn description(&self) -> &str {
        &self.manifest.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.manifest.parameters.clone()
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let args_json = serde_json::to_string(&arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        debug!(plugin = %self.manifest.name, command = %self.manifest.command, "Running plugin tool");

        let mut command = Command::new(&self.manifest.command);
        command.args(&self.manifest.args).arg(&args_json);

        let timeout = Duration::from_secs(self.manifest.timeout_secs.max(1));
        let output = match tokio::time::timeout(timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: self.manifest.name.clone(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ToolError::Timeout {
                    tool_name: self.manifest.name.clone(),
                    timeout_secs: self.manifest.timeout_secs,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if output.status.success() {
            Ok(ToolOutput::ok(stdout))
        } else {
            let code = output.status.code().unwrap_or(-1);
            Ok(ToolOutput::fail(if stderr.is_empty() {
                format!("Plugin exited with code {code}")
            } else {
                format!("Plugin exited with code {code}: {stderr}")
            }))
        }
    }
}

/// Discover plugin tools from `*.toml` manifests in `dir`.
///
/// Unreadable or malformed manifests are logged and skipped; a bad plugin
/// never prevents the rest from loading.
pub fn discover_plugins(dir: &Path) -> Vec<PluginTool> {
    let entries = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(_) => return Vec::new(), // no plugin directory — nothing to load
    };

    let mut manifests: Vec<std::path::PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("toml"))
        .collect();
    manifests.sort();

    let mut plugins = Vec::new();
    for path in manifests {
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable plugin manifest");
                continue;
            }
        };
        match toml::from_str::<PluginManifest>(&raw) {
            Ok(manifest) => {
                debug!(plugin = %manifest.name, path = %path.display(), "Discovered plugin tool");
                plugins.push(PluginTool::new(manifest));
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping malformed plugin manifest");
            }
        }
    }
    plugins
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
name = "greet"
description = "Greets the caller"
command = "/bin/echo"
args = ["hello"]
timeout_secs = 5

[parameters]
type = "object"
required = ["who"]
[parameters.properties.who]
type = "string"
"#;

    #[test]
    fn manifest_parses() {
        let manifest: PluginManifest = toml::from_str(MANIFEST).unwrap();
        assert_eq!(manifest.name, "greet");
        assert_eq!(manifest.command, "/bin/echo");
        assert_eq!(manifest.timeout_secs, 5);
        assert_eq!(manifest.parameters["required"], serde_json::json!(["who"]));
    }

    #[test]
    fn manifest_defaults() {
        let manifest: PluginManifest =
            toml::from_str("name = \"x\"\ndescription = \"d\"\ncommand = \"/bin/true\"\n").unwrap();
        assert_eq!(manifest.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(manifest.args.is_empty());
        assert!(manifest.parameters["properties"].is_object());
    }

    #[tokio::test]
    async fn plugin_executes_command() {
        let manifest: PluginManifest = toml::from_str(MANIFEST).unwrap();
        let tool = PluginTool::new(manifest);

        let result = tool
            .execute(serde_json::json!({"who": "world"}))
            .await
            .unwrap();
        assert!(result.success);
        // /bin/echo hello '{"who":"world"}'
        assert!(result.output.starts_with("hello"));
        assert!(result.output.contains("world"));
    }

    #[tokio::test]
    async fn missing_command_is_execution_error() {
        let tool = PluginTool::new(PluginManifest {
            name: "ghost".into(),
            description: "d".into(),
            command: "/no/such/binary".into(),
            args: vec![],
            timeout_secs: 5,
            parameters: empty_schema(),
        });
        let result = tool.execute(serde_json::json!({})).await;
        assert!(matches!(result, Err(ToolError::ExecutionFailed { .. })));
    }

    #[tokio::test]
    async fn slow_plugin_times_out() {
        let tool = PluginTool::new(PluginManifest {
            name: "slow".into(),
            description: "d".into(),
            command: "sleep".into(),
            args: vec!["5".into()],
            timeout_secs: 1,
            parameters: empty_schema(),
        });
        let result = tool.execute(serde_json::json!({})).await;
        assert!(matches!(result, Err(ToolError::Timeout { .. })));
    }

    #[test]
    fn discovery_skips_malformed_manifests() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.toml"), MANIFEST).unwrap();
        std::fs::write(dir.path().join("bad.toml"), "not really toml [[[").unwrap();
        std::fs::write(dir.path().join("ignored.json"), "{}").unwrap();

        let plugins = discover_plugins(dir.path());
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].name(), "greet");
    }

    #[test]
    fn discovery_of_missing_dir_is_empty() {
        let plugins = discover_plugins(Path::new("/no/such/plugin/dir"));
        assert!(plugins.is_empty());
    }
}
