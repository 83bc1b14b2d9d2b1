//! System introspection tool — host, CPU, memory, and load snapshot.
//!
//! Reads /proc where available (Linux) and degrades gracefully elsewhere;
//! the answer is a short human-readable report, not a metrics feed.

use async_trait::async_trait;
use sotto_core::error::ToolError;
use sotto_core::tool::{Tool, ToolOutput};

pub struct SystemInfoTool;

impl SystemInfoTool {
    fn hostname() -> String {
        std::fs::read_to_string("/etc/hostname")
            .map(|h| h.trim().to_string())
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| "unknown".into())
    }

    fn cpu_count() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// Total and available memory in MiB, from /proc/meminfo.
    fn memory_mib() -> Option<(u64, u64)> {
        let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
        let mut total = None;
        let mut available = None;

        for line in meminfo.lines() {
            let mut parts = line.split_whitespace();
            match parts.next() {
                Some("MemTotal:") => total = parts.next().and_then(|v| v.parse::<u64>().ok()),
                Some("MemAvailable:") => {
                    available = parts.next().and_then(|v| v.parse::<u64>().ok());
                }
                _ => {}
            }
        }

        Some((total? / 1024, available? / 1024))
    }

    /// 1/5/15-minute load averages, from /proc/loadavg.
    fn load_average() -> Option<String> {
        let loadavg = std::fs::read_to_string("/proc/loadavg").ok()?;
        let fields: Vec<&str> = loadavg.split_whitespace().take(3).collect();
        if fields.len() == 3 {
            Some(fields.join(" / "))
        } else {
            None
        }
    }

    fn report() -> String {
        let mut lines = vec![
            format!("Host: {}", Self::hostname()),
            format!("OS: {} ({})", std::env::consts::OS, std::env::consts::ARCH),
            format!("CPU cores: {}", Self::cpu_count()),
        ];

        match Self::memory_mib() {
            Some((total, available)) => {
                let used = total.saturating_sub(available);
                lines.push(format!(
                    "Memory: {used} MiB used of {total} MiB ({available} MiB available)"
                ));
            }
            None => lines.push("Memory: unavailable on this platform".into()),
        }

        if let Some(load) = Self::load_average() {
            lines.push(format!("Load average (1/5/15 min): {load}"));
        }

        lines.join("\n")
    }
}

#[async_trait]
impl Tool for SystemInfoTool {
    fn name(&self) -> &str {
        "system_info"
    }

    fn description(&self) -> &str {
        "Report a snapshot of this machine: hostname, OS, CPU cores, memory usage, and load average."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::ok(Self::report()))
    }
}
