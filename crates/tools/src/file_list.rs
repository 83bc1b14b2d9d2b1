//! Directory listing tool.

use crate::policy::{Policy, validate_path};
use async_trait::async_trait;
use sotto_core::error::ToolError;
use sotto_core::tool::{Tool, ToolOutput};

pub struct FileListTool {
    policy: Policy,
}

impl FileListTool {
    pub fn new(policy: Policy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for FileListTool {
    fn name(&self) -> &str {
        "file_list"
    }

    fn description(&self) -> &str {
        "List the entries of a directory. Directories are marked with a trailing slash."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The directory to list"
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
            tool_name: "file_list".into(),
            reason: e.to_string(),
        })?;

        let mut read_dir = match tokio::fs::read_dir(&resolved).await {
            Ok(rd) => rd,
            Err(e) => return Ok(ToolOutput::fail(format!("Failed to list directory: {e}"))),
        };

        let mut entries = Vec::new();
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push(if is_dir { format!("{name}/") } else { name });
        }
        entries.sort();

        if entries.is_empty() {
            Ok(ToolOutput::ok("(empty directory)"))
        } else {
            Ok(ToolOutput::ok(entries.join("\n")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "x").unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let tool = FileListTool::new(Policy::default());
        let result = tool
            .execute(serde_json::json!({"path": dir.path().to_str().unwrap()}))
            .await
            .unwrap();

        assert!(result.success);
        let lines: Vec<&str> = result.output.lines().collect();
        assert_eq!(lines, vec!["a.txt", "b.txt", "sub/"]);
    }

    #[tokio::test]
    async fn empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileListTool::new(Policy::default());
        let result = tool
            .execute(serde_json::json!({"path": dir.path().to_str().unwrap()}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("empty"));
    }

    #[tokio::test]
    async fn nonexistent_directory_is_domain_failure() {
        let tool = FileListTool::new(Policy::default());
        let result = tool
            .execute(serde_json::json!({"path": "/tmp/sotto_no_such_dir_55121"}))
            .await
            .unwrap();
        assert!(!result.success);
    }
}
