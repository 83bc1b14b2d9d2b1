//! Clock tools — current time and date in speech-friendly formats.

use async_trait::async_trait;
use chrono::Local;
use sotto_core::error::ToolError;
use sotto_core::tool::{Tool, ToolOutput};

pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current local time in 12-hour format (e.g., '3:45 PM')."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::ok(Local::now().format("%-I:%M %p").to_string()))
    }
}

pub struct CurrentDateTool;

#[async_trait]
impl Tool for CurrentDateTool {
    fn name(&self) -> &str {
        "get_current_date"
    }

    fn description(&self) -> &str {
        "Get today's date in a readable format (e.g., 'Monday, November 30, 2026')."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::ok(Local::now().format("%A, %B %-d, %Y").to_string()))
    }
}
