//! Web search tool — DuckDuckGo instant-answer API.
//!
//! Uses the JSON instant-answer endpoint rather than scraping result pages.
//! Answers come back in a compact form suitable for speaking aloud.

use async_trait::async_trait;
use sotto_core::error::ToolError;
use sotto_core::tool::{Tool, ToolOutput};
use tracing::debug;

const API_URL: &str = "https://api.duckduckgo.com/";

pub struct WebSearchTool {
    client: reqwest::Client,
}

impl WebSearchTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent("sotto-voice-assistant")
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

    /// Turn an instant-answer payload into a spoken-friendly summary.
    fn summarize(body: &serde_json::Value, max_results: usize) -> Option<String> {
        let mut lines: Vec<String> = Vec::new();

        let abstract_text = body["AbstractText"].as_str().unwrap_or("");
        if !abstract_text.is_empty() {
            let source = body["AbstractSource"].as_str().unwrap_or("");
            if source.is_empty() {
                lines.push(abstract_text.to_string());
            } else {
                lines.push(format!("{abstract_text} (source: {source})"));
            }
        }

        if let Some(answer) = body["Answer"].as_str()
            && !answer.is_empty()
        {
            lines.push(answer.to_string());
        }

        if let Some(topics) = body["RelatedTopics"].as_array() {
            for topic in topics {
                if lines.len() >= max_results {
                    break;
                }
                if let Some(text) = topic["Text"].as_str()
                    && !text.is_empty()
                {
                    lines.push(text.to_string());
                }
            }
        }

        if lines.is_empty() {
            None
        } else {
            lines.truncate(max_results);
            Some(lines.join("\n"))
        }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for factual information. Returns a short summary of the best available answers."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to include (default 3)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        let max_results = arguments["max_results"].as_u64().unwrap_or(3).clamp(1, 10) as usize;

        debug!(query = %query, "Searching the web");

        let response = self
            .client
            .get(API_URL)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "web_search".into(),
                reason: e.to_string(),
            })?;

        let body: serde_json::Value =
            response.json().await.map_err(|e| ToolError::ExecutionFailed {
                tool_name: "web_search".into(),
                reason: format!("Unparseable search response: {e}"),
            })?;

        match Self::summarize(&body, max_results) {
            Some(summary) => Ok(ToolOutput::ok(summary)),
            None => Ok(ToolOutput::fail(format!("No results found for '{query}'"))),
        }
    }
}
