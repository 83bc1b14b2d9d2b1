//! Application launcher tool — start a detached allowlisted process.
//!
//! The assistant never gets an arbitrary shell. It may only start
//! applications named in the policy allowlist, with plain arguments, and the
//! process is detached so the turn does not block on it.

use crate::policy::Policy;
use async_trait::async_trait;
use sotto_core::error::ToolError;
use sotto_core::tool::{Tool, ToolOutput};
use tokio::process::Command;
use tracing::{debug, warn};

pub struct LaunchAppTool {
    policy: Policy,
}

impl LaunchAppTool {
    pub fn new(policy: Policy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for LaunchAppTool {
    fn name(&self) -> &str {
        "launch_app"
    }

    fn description(&self) -> &str {
        "Launch an application by name, optionally with arguments (e.g. a URL or file to open). Only allowlisted applications can be started."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "application": {
                    "type": "string",
                    "description": "The application to launch (e.g. 'firefox')"
                },
                "args": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Arguments passed to the application"
                }
            },
            "required": ["application"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let application = arguments["application"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'application' argument".into()))?;

        if !self.policy.command_allowed(application) {
            return Err(ToolError::PermissionDenied {
                tool_name: "launch_app".into(),
                reason: format!("Application '{application}' not in allowlist"),
            });
        }

        let args: Vec<String> = arguments["args"]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        debug!(application = %application, args = ?args, "Launching application");

        match Command::new(application).args(&args).spawn() {
            Ok(child) => {
                let pid = child.id();
                // Detach: the child keeps running after the turn ends
                drop(child);
                Ok(ToolOutput::ok(match pid {
                    Some(pid) => format!("Launched {application} (pid {pid})"),
                    None => format!("Launched {application}"),
                }))
            }
            Err(e) => {
                warn!(application = %application, error = %e, "Launch failed");
                Ok(ToolOutput::fail(format!("Failed to launch {application}: {e}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow(commands: &[&str]) -> Policy {
        Policy {
            allowed_commands: commands.iter().map(|s| s.to_string()).collect(),
            ..Policy::default()
        }
    }

    #[tokio::test]
    async fn blocked_application() {
        let tool = LaunchAppTool::new(allow(&["firefox"]));
        let result = tool
            .execute(serde_json::json!({"application": "rm"}))
            .await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }

    #[tokio::test]
    async fn empty_allowlist_denies_everything() {
        let tool = LaunchAppTool::new(Policy::default());
        let result = tool
            .execute(serde_json::json!({"application": "true"}))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn launches_allowlisted_binary() {
        // `true` exits immediately and exists on any unix test machine
        let tool = LaunchAppTool::new(allow(&["true"]));
        let result = tool
            .execute(serde_json::json!({"application": "true"}))
            .await
            .unwrap();
        assert!(result.success, "{}", result.output);
        assert!(result.output.contains("Launched"));
    }

    #[tokio::test]
    async fn missing_binary_is_domain_failure() {
        let tool = LaunchAppTool::new(allow(&["sotto_no_such_binary"]));
        let result = tool
            .execute(serde_json::json!({"application": "sotto_no_such_binary"}))
            .await
            .unwrap();
        assert!(!result.success);
    }
}
