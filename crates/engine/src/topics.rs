//! Lightweight topic and preference extraction.
//!
//! Plain keyword matching. The results feed the cross-session conversation
//! state; anything richer belongs to the model.

/// Topic label → trigger keywords.
const TOPIC_KEYWORDS: &[(&str, &[&str])] = &[
    ("files", &["file", "files", "document", "documents", "folder"]),
    ("applications", &["app", "application", "program", "software", "launch", "open"]),
    ("system", &["system", "computer", "machine", "cpu", "memory", "disk"]),
    ("network", &["network", "internet", "connection", "wifi"]),
    ("time", &["time", "clock", "schedule", "calendar", "date"]),
    ("email", &["email", "mail", "inbox"]),
    ("search", &["search", "find", "look up", "query"]),
    ("code", &["code", "programming", "script", "function", "compile"]),
    ("music", &["music", "song", "audio", "playlist"]),
    ("video", &["video", "movie", "film", "youtube"]),
    ("weather", &["weather", "rain", "forecast", "temperature"]),
];

/// Extract coarse topics from one turn of text.
pub fn extract_topics(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOPIC_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(topic, _)| topic.to_string())
        .collect()
}

/// Detect explicit preference statements in user text.
///
/// Returns `(key, value)` pairs; only fires when the user signals intent
/// ("prefer", "like", "favorite", "always", "keep it").
pub fn extract_preferences(text: &str) -> Vec<(String, String)> {
    let lower = text.to_lowercase();
    let intent = ["prefer", "like", "favorite", "always", "keep it"]
        .iter()
        .any(|w| lower.contains(w));
    if !intent {
        return Vec::new();
    }

    let mut prefs = Vec::new();

    if lower.contains("dark mode") || lower.contains("dark theme") {
        prefs.push(("theme".to_string(), "dark".to_string()));
    } else if lower.contains("light mode") || lower.contains("light theme") {
        prefs.push(("theme".to_string(), "light".to_string()));
    }

    if lower.contains("short answer") || lower.contains("brief") || lower.contains("concise") {
        prefs.push(("style".to_string(), "concise".to_string()));
    } else if lower.contains("detail") || lower.contains("thorough") {
        prefs.push(("style".to_string(), "detailed".to_string()));
    }

    if lower.contains("quiet") || lower.contains("silent") {
        prefs.push(("notifications".to_string(), "quiet".to_string()));
    }

    prefs
}

/// The tool-gating heuristic: does this turn look like it needs tools?
///
/// Used only when `tool_gating = "heuristic"` — a latency shortcut that
/// skips sending tool schemas (and unlocks streaming) for turns that look
/// purely conversational. False negatives cost a capability, not
/// correctness, which is why "always" is the default.
pub fn wants_tools(text: &str) -> bool {
    const TOOL_HINTS: &[&str] = &[
        "time", "date", "today", "file", "folder", "read", "write", "list", "open", "launch",
        "start", "search", "weather", "news", "system", "cpu", "memory", "disk", "run",
    ];
    let lower = text.to_lowercase();
    TOOL_HINTS.iter().any(|hint| {
        lower
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| word == *hint)
    })
}
