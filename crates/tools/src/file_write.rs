//! File write tool — create or overwrite files with path validation.

use crate::policy::{Policy, validate_path};
use async_trait::async_trait;
use sotto_core::error::ToolError;
use sotto_core::tool::{Tool, ToolOutput};

pub struct FileWriteTool {
    policy: Policy,
}

impl FileWriteTool {
    pub fn new(policy: Policy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write text content to a file, creating it if it does not exist and overwriting it if it does."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write"
                },
                "content": {
                    "type": "string",
                    "description": "The text content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;

        let resolved =
            validate_path(path, &self.policy).map_err(|e| ToolError::PermissionDenied {
                tool_name: "file_write".into(),
                reason: e.to_string(),
            })?;

        if let Some(parent) = resolved.parent()
            && !parent.exists()
        {
            return Ok(ToolOutput::fail(format!(
                "Parent directory does not exist: {}",
                parent.display()
            )));
        }

        match tokio::fs::write(&resolved, content).await {
            Ok(()) => Ok(ToolOutput::ok(format!(
                "Wrote {} bytes to {}",
                content.len(),
                resolved.display()
            ))),
            Err(e) => Ok(ToolOutput::fail(format!("Failed to write file: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("memo.txt");

        let tool = FileWriteTool::new(Policy::default());
        let result = tool
            .execute(serde_json::json!({
                "path": file_path.to_str().unwrap(),
                "content": "remember the milk"
            }))
            .await
            .unwrap();

        assert!(result.success, "{}", result.output);
        let written = std::fs::read_to_string(&file_path).unwrap();
        assert_eq!(written, "remember the milk");
    }

    #[tokio::test]
    async fn missing_parent_is_domain_failure() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("no_such_subdir").join("memo.txt");

        let tool = FileWriteTool::new(Policy::default());
        let result = tool
            .execute(serde_json::json!({
                "path": file_path.to_str().unwrap(),
                "content": "x"
            }))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.output.contains("Parent directory"));
    }

    #[tokio::test]
    async fn missing_content_argument() {
        let tool = FileWriteTool::new(Policy::default());
        let result = tool.execute(serde_json::json!({"path": "/tmp/x.txt"})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn forbidden_path_blocked() {
        let tool = FileWriteTool::new(Policy {
            forbidden_paths: vec!["/etc".into()],
            ..Policy::default()
        });
        let result = tool
            .execute(serde_json::json!({"path": "/etc/evil.conf", "content": "x"}))
            .await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }
}
