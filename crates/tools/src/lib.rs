//! Built-in tool implementations for Sotto.
//!
//! Tools give the assistant the ability to act on the machine it lives on:
//! tell the time, read and write files, launch applications, search the
//! web, and report system health. User-provided plugin tools are discovered
//! from TOML manifests and registered alongside the built-ins.
//!
//! Security defaults:
//! - `launch_app`: only allowlisted applications can be started
//! - File tools: sensitive paths (~/.ssh, /etc/shadow, ...) are blocked

pub mod clock;
pub mod file_list;
pub mod file_read;
pub mod file_write;
pub mod launch_app;
pub mod plugin;
pub mod policy;
pub mod system_info;
pub mod web_search;

pub use plugin::{PluginManifest, PluginTool, discover_plugins};
pub use policy::{Policy, validate_path};

use sotto_core::Tool;
use sotto_core::tool::ToolRegistry;
use std::path::Path;
use tracing::{info, warn};

/// Create a registry with all built-in tools under the given policy.
pub fn default_registry(policy: &Policy) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    // Built-in names are distinct by construction, so overrides never fire
    registry.register_override(Box::new(clock::CurrentTimeTool));
    registry.register_override(Box::new(clock::CurrentDateTool));
    registry.register_override(Box::new(file_read::FileReadTool::new(policy.clone())));
    registry.register_override(Box::new(file_write::FileWriteTool::new(policy.clone())));
    registry.register_override(Box::new(file_list::FileListTool::new(policy.clone())));
    registry.register_override(Box::new(launch_app::LaunchAppTool::new(policy.clone())));
    registry.register_override(Box::new(web_search::WebSearchTool::new()));
    registry.register_override(Box::new(system_info::SystemInfoTool));
    registry
}

/// Discover plugin tools in `dir` and register them.
///
/// A plugin may not shadow an existing tool name; collisions are logged and
/// skipped. Returns how many plugins were registered.
pub fn register_plugins(registry: &mut ToolRegistry, dir: &Path) -> usize {
    let mut registered = 0;
    for plugin in discover_plugins(dir) {
        let name = plugin.name().to_string();
        match registry.register(Box::new(plugin)) {
            Ok(()) => {
                info!(plugin = %name, "Registered plugin tool");
                registered += 1;
            }
            Err(e) => {
                warn!(plugin = %name, error = %e, "Skipping plugin tool");
            }
        }
    }
    registered
}
