//! File read tool — read file contents with path validation.

use crate::policy::{Policy, validate_path};
use async_trait::async_trait;
use sotto_core::error::ToolError;
use sotto_core::tool::{Tool, ToolOutput};

pub struct FileReadTool {
    policy: Policy,
}

impl FileReadTool {
    pub fn new(policy: Policy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file at the given path."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        let resolved = validate_path(path, &self.policy).map_err(|e| ToolError::PermissionDenied {
            tool_name: "file_read".into(),
            reason: e.to_string(),
        })?;

        match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => Ok(ToolOutput::ok(content)),
            Err(e) => Ok(ToolOutput::fail(format!("Failed to read file: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn tool_definition() {
        let tool = FileReadTool::new(Policy::default());
        assert_eq!(tool.name(), "file_read");
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"], serde_json::json!(["path"]));
    }

    #[tokio::test]
    async fn read_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("note.txt");
        let mut f = std::fs::File::create(&file_path).unwrap();
        writeln!(f, "shopping list").unwrap();

        let tool = FileReadTool::new(Policy::default());
        let result = tool
            .execute(serde_json::json!({"path": file_path.to_str().unwrap()}))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("shopping list"));
    }

    #[tokio::test]
    async fn read_nonexistent_file_is_domain_failure() {
        let tool = FileReadTool::new(Policy::default());
        let result = tool
            .execute(serde_json::json!({"path": "/tmp/sotto_test_missing_98431.txt"}))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.output.contains("Failed to read file"));
    }

    #[tokio::test]
    async fn missing_path_argument() {
        let tool = FileReadTool::new(Policy::default());
        assert!(tool.execute(serde_json::json!({})).await.is_err());
    }

    #[tokio::test]
    async fn path_traversal_blocked() {
        let tool = FileReadTool::new(Policy {
            allowed_roots: vec!["/home/user/workspace".into()],
            ..Policy::default()
        });
        let result = tool
            .execute(serde_json::json!({"path": "../../../etc/passwd"}))
            .await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }

    #[tokio::test]
    async fn forbidden_path_blocked() {
        let tool = FileReadTool::new(Policy {
            forbidden_paths: vec!["/etc".into()],
            ..Policy::default()
        });
        let result = tool.execute(serde_json::json!({"path": "/etc/shadow"})).await;
        assert!(result.is_err());
    }
}
