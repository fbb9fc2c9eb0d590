//! Render `tools/call` results as text for the model.

use serde_json::Value;

pub const EMPTY_SUCCESS: &str = "✅ Action completed successfully";
pub const NO_RESULTS: &str = "No results found";

/// Turn a tool result into one human-readable string.
pub fn render_tool_result(result: &Value) -> String {
    match result {
        Value::Null => EMPTY_SUCCESS.to_string(),
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get("content") {
                let text = render_content(items);
                let is_error = map.get("isError").and_then(Value::as_bool).unwrap_or(false);
                return match (text.is_empty(), is_error) {
                    (true, false) => EMPTY_SUCCESS.to_string(),
                    (true, true) => "Tool error: (no details)".to_string(),
                    (false, true) => format!("Tool error: {text}"),
                    (false, false) => text,
                };
            }
            if let Some(url) = map.get("url").and_then(Value::as_str) {
                return format!("✅ Created: {url}");
            }
            if let Some(message) = map.get("message").and_then(Value::as_str) {
                return format!("✅ {message}");
            }
            pretty(result)
        }
        Value::Array(items) if items.is_empty() => NO_RESULTS.to_string(),
        Value::Array(_) => pretty(result),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Text items contribute their `text`; anything else is shown as JSON.
fn render_content(items: &[Value]) -> String {
    items
        .iter()
        .map(|item| {
            let is_text = item.get("type").and_then(Value::as_str) == Some("text");
            match item.get("text").and_then(Value::as_str) {
                Some(text) if is_text => text.to_string(),
                _ => pretty(item),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
