//! Name-keyed table of in-process tool handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use clawbot_core::types::{ToolDescriptor, ToolOrigin};
use tracing::{debug, warn};

use super::base::Tool;

/// Handlers of one origin (built-in or channel action), sorted by name.
pub struct HandlerTable {
    origin: ToolOrigin,
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl HandlerTable {
    pub fn new(origin: ToolOrigin) -> Self {
        Self {
            origin,
            tools: BTreeMap::new(),
        }
    }

    /// Register a handler. The first handler for a name wins; later ones
    /// are logged and dropped.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> bool {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            warn!(tool = %name, "duplicate tool handler, skipping");
            return false;
        }
        debug!(tool = %name, origin = ?self.origin, "registered tool");
        self.tools.insert(name, tool);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .map(|t| t.to_descriptor(self.origin.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clawbot_core::types::TurnContext;
    use serde_json::{json, Value};

    struct Named(&'static str, &'static str);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            self.1
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}, "required": []})
        }
        async fn execute(&self, _args: &Value, _ctx: &TurnContext) -> anyhow::Result<String> {
            Ok(self.1.to_string())
        }
    }

    #[test]
    fn test_register_sorted_and_first_wins() {
        let mut table = HandlerTable::new(ToolOrigin::ChannelAction);
        assert!(table.register(Arc::new(Named("pin_message", "first"))));
        assert!(table.register(Arc::new(Named("forward_message", "fwd"))));
        assert!(!table.register(Arc::new(Named("pin_message", "second"))));

        assert_eq!(table.len(), 2);
        assert_eq!(table.names(), vec!["forward_message", "pin_message"]);
        assert_eq!(table.get("pin_message").unwrap().description(), "first");
        assert!(table.has("forward_message"));
        assert!(!table.has("send_message"));
    }

    #[test]
    fn test_descriptors_carry_origin() {
        let mut table = HandlerTable::new(ToolOrigin::BuiltIn);
        assert!(table.is_empty());
        table.register(Arc::new(Named("search_knowledge_base", "search")));
        let descriptors = table.descriptors();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].origin, ToolOrigin::BuiltIn);
        assert_eq!(descriptors[0].input_schema["type"], "object");
    }
}
