//! Tool trait — the handler shape shared by built-in and channel-action tools.

use async_trait::async_trait;
use serde_json::Value;

use clawbot_core::types::{ToolDescriptor, ToolOrigin, TurnContext};

// ─────────────────────────────────────────────
// Tool trait
// ─────────────────────────────────────────────

/// An in-process tool handler.
///
/// The registry publishes `name()`, `description()` and `parameters()` to
/// the model; the dispatcher calls `execute()` with the model's arguments
/// and the context of the turn that asked for it.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model calls this tool by (e.g. `"send_message"`).
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// `{"type": "object", "properties": {...}, "required": [...]}`.
    fn parameters(&self) -> Value;

    /// Run the tool. An `Err` is turned into text by the dispatcher.
    async fn execute(&self, args: &Value, ctx: &TurnContext) -> anyhow::Result<String>;

    fn to_descriptor(&self, origin: ToolOrigin) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameters(),
            origin,
        }
    }
}

// ─────────────────────────────────────────────
// Param helpers
// ─────────────────────────────────────────────

/// Extract a required string argument.
pub fn require_string(args: &Value, key: &str) -> anyhow::Result<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Missing required parameter: {key}"))
}

pub fn optional_string(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Chat, user and message ids arrive as JSON numbers or numeric strings.
pub fn optional_id(args: &Value, key: &str) -> anyhow::Result<Option<i64>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("Parameter {key} is not an integer id: {n}")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("Parameter {key} is not an integer id: {s}")),
        Some(other) => anyhow::bail!("Parameter {key} is not an integer id: {other}"),
    }
}

pub fn require_id(args: &Value, key: &str) -> anyhow::Result<i64> {
    optional_id(args, key)?.ok_or_else(|| anyhow::anyhow!("Missing required parameter: {key}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_require_string() {
        let args = json!({"query": "deploy", "n": 3});
        assert_eq!(require_string(&args, "query").unwrap(), "deploy");
        assert!(require_string(&args, "missing").is_err());
        assert!(require_string(&args, "n").is_err());
        assert_eq!(optional_string(&args, "query").as_deref(), Some("deploy"));
        assert_eq!(optional_string(&args, "other"), None);
    }

    #[test]
    fn test_ids_accept_numbers_and_strings() {
        let args = json!({"a": -1001234, "b": "42", "c": " 7 ", "d": "x", "e": 1.5, "f": null});
        assert_eq!(require_id(&args, "a").unwrap(), -1001234);
        assert_eq!(require_id(&args, "b").unwrap(), 42);
        assert_eq!(require_id(&args, "c").unwrap(), 7);
        assert!(require_id(&args, "d").is_err());
        assert!(require_id(&args, "e").is_err());
        assert_eq!(optional_id(&args, "f").unwrap(), None);
        assert_eq!(optional_id(&args, "g").unwrap(), None);
        let err = require_id(&args, "g").unwrap_err();
        assert_eq!(err.to_string(), "Missing required parameter: g");
    }

    #[test]
    fn test_to_descriptor_default() {
        struct Dummy;

        #[async_trait]
        impl Tool for Dummy {
            fn name(&self) -> &str {
                "dummy"
            }
            fn description(&self) -> &str {
                "A test tool"
            }
            fn parameters(&self) -> Value {
                json!({"type": "object", "properties": {}, "required": []})
            }
            async fn execute(&self, _args: &Value, _ctx: &TurnContext) -> anyhow::Result<String> {
                Ok("ok".into())
            }
        }

        let d = Dummy.to_descriptor(ToolOrigin::BuiltIn);
        assert_eq!(d.name, "dummy");
        assert_eq!(d.description, "A test tool");
        assert_eq!(d.origin, ToolOrigin::BuiltIn);
    }
}
