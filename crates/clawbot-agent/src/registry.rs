//! Tool registry and name resolver.
//!
//! One namespace over three origins: built-in handlers, channel-action
//! handlers, and the tools of every live tool server, published as
//! `"{server}_{tool}"`. Routing is decided once per call by [`ToolRegistry::route`].

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use clawbot_core::types::{ToolDescriptor, ToolOrigin, ToolSchema};
use clawbot_mcp::{ExternalServer, ToolServers};

use crate::tools::base::Tool;
use crate::tools::handlers::HandlerTable;

/// Published name of `tool` on `server`.
pub fn namespaced(server: &str, tool: &str) -> String {
    format!("{server}_{tool}")
}

/// Where a tool call goes.
#[derive(Clone)]
pub enum ToolRoute {
    BuiltIn(Arc<dyn Tool>),
    ChannelAction(Arc<dyn Tool>),
    External { server: String, tool: String },
    Unknown,
}

impl std::fmt::Debug for ToolRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolRoute::BuiltIn(t) => write!(f, "BuiltIn({})", t.name()),
            ToolRoute::ChannelAction(t) => write!(f, "ChannelAction({})", t.name()),
            ToolRoute::External { server, tool } => write!(f, "External({server}, {tool})"),
            ToolRoute::Unknown => f.write_str("Unknown"),
        }
    }
}

pub struct ToolRegistry {
    builtins: HandlerTable,
    actions: HandlerTable,
    servers: Arc<ToolServers>,
}

impl ToolRegistry {
    pub fn new(servers: Arc<ToolServers>) -> Self {
        Self {
            builtins: HandlerTable::new(ToolOrigin::BuiltIn),
            actions: HandlerTable::new(ToolOrigin::ChannelAction),
            servers,
        }
    }

    pub fn register_builtin(&mut self, tool: Arc<dyn Tool>) -> bool {
        self.builtins.register(tool)
    }

    /// Register a channel action. Names taken by a built-in are skipped.
    pub fn register_action(&mut self, tool: Arc<dyn Tool>) -> bool {
        if self.builtins.has(tool.name()) {
            warn!(tool = %tool.name(), "channel action shadows a built-in tool, skipping");
            return false;
        }
        self.actions.register(tool)
    }

    pub fn servers(&self) -> &Arc<ToolServers> {
        &self.servers
    }

    /// Built-ins, then channel actions, then external tools grouped by server.
    ///
    /// An external tool whose published name is already taken is logged and
    /// left out. Servers are visited longest name first so that when two
    /// servers publish the same name, the kept one is the one
    /// [`resolve`](Self::resolve) picks.
    pub fn aggregate(&self) -> Vec<ToolDescriptor> {
        let mut descriptors = self.builtins.descriptors();
        descriptors.extend(self.actions.descriptors());
        let mut taken: HashSet<String> = descriptors.iter().map(|d| d.name.clone()).collect();

        let mut live: Vec<&ExternalServer> = self.servers.live().collect();
        live.sort_by(|a, b| {
            b.name()
                .len()
                .cmp(&a.name().len())
                .then_with(|| a.name().cmp(b.name()))
        });

        let mut external = Vec::new();
        for server in live {
            for tool in server.tools() {
                let name = namespaced(server.name(), &tool.name);
                if !taken.insert(name.clone()) {
                    warn!(server = %server.name(), tool = %tool.name, name = %name, "tool name collision, skipping");
                    continue;
                }
                external.push(ToolDescriptor {
                    name,
                    description: tool.description_for(server.name()),
                    input_schema: tool.schema(),
                    origin: ToolOrigin::External {
                        server: server.name().to_string(),
                    },
                });
            }
        }
        external.sort_by(|a, b| origin_server(a).cmp(origin_server(b)));
        descriptors.extend(external);
        descriptors
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.aggregate().iter().map(ToolDescriptor::to_schema).collect()
    }

    /// Split a published name into `(server, tool)` for a live server.
    ///
    /// Among live servers whose name plus `_` prefixes `name`, the longest
    /// one that lists the remainder wins; if none lists it, the longest
    /// prefix wins. An empty remainder is not a match.
    pub fn resolve(&self, name: &str) -> Option<(String, String)> {
        let mut candidates: Vec<(&ExternalServer, &str)> = self
            .servers
            .live()
            .filter_map(|server| {
                let rest = name.strip_prefix(server.name())?.strip_prefix('_')?;
                (!rest.is_empty()).then_some((server, rest))
            })
            .collect();
        candidates.sort_by(|a, b| b.0.name().len().cmp(&a.0.name().len()));

        let (server, tool) = candidates
            .iter()
            .find(|(server, rest)| server.tools().iter().any(|t| t.name == *rest))
            .or_else(|| candidates.first())?;
        Some((server.name().to_string(), tool.to_string()))
    }

    /// Built-in, then channel action, then external.
    pub fn route(&self, name: &str) -> ToolRoute {
        let route = if let Some(tool) = self.builtins.get(name) {
            ToolRoute::BuiltIn(tool.clone())
        } else if let Some(tool) = self.actions.get(name) {
            ToolRoute::ChannelAction(tool.clone())
        } else if let Some((server, tool)) = self.resolve(name) {
            ToolRoute::External { server, tool }
        } else {
            ToolRoute::Unknown
        };
        debug!(tool = %name, route = ?route, "routed tool call");
        route
    }
}

fn origin_server(descriptor: &ToolDescriptor) -> &str {
    match &descriptor.origin {
        ToolOrigin::External { server } => server,
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fake_server;
    use crate::tools::actions::{action_tools, tests::RecordingActions};
    use crate::tools::knowledge::{SearchKnowledgeTool, SessionKnowledgeBase};
    use clawbot_core::session::SessionManager;

    fn knowledge_tool(dir: &tempfile::TempDir) -> Arc<dyn Tool> {
        let sessions = Arc::new(SessionManager::new(Some(dir.path().to_path_buf())).unwrap());
        Arc::new(SearchKnowledgeTool::new(
            Arc::new(SessionKnowledgeBase::new(sessions)),
            10,
            0.3,
        ))
    }

    async fn registry(servers: Vec<ExternalServer>, dir: &tempfile::TempDir) -> ToolRegistry {
        let mut registry = ToolRegistry::new(Arc::new(ToolServers::from_servers(servers)));
        registry.register_builtin(knowledge_tool(dir));
        for tool in action_tools(Arc::new(RecordingActions::default())) {
            registry.register_action(tool);
        }
        registry
    }

    #[test]
    fn test_namespaced() {
        assert_eq!(namespaced("github", "list_repos"), "github_list_repos");
    }

    #[tokio::test]
    async fn test_aggregate_orders_and_namespaces() {
        let dir = tempfile::tempdir().unwrap();
        let servers = vec![
            fake_server("notion", &["search"]).await,
            fake_server("github", &["list_repos", "create_issue"]).await,
        ];
        let registry = registry(servers, &dir).await;
        let tools = registry.aggregate();
        let names: Vec<&str> = tools.iter().map(|d| d.name.as_str()).collect();

        assert_eq!(names.len(), 1 + 8 + 3);
        assert_eq!(names[0], "search_knowledge_base");
        assert_eq!(tools[1].origin, ToolOrigin::ChannelAction);
        assert_eq!(&names[9..], &["github_list_repos", "github_create_issue", "notion_search"]);
        assert_eq!(tools[11].description, "fake search");
        assert_eq!(
            tools[11].origin,
            ToolOrigin::External {
                server: "notion".into()
            }
        );
        assert_eq!(registry.schemas().len(), 12);
    }

    #[tokio::test]
    async fn test_aggregate_names_are_unique_and_resolve_back() {
        let dir = tempfile::tempdir().unwrap();
        // "a" publishes a_b_c, and so does "a_b"; "search" collides with the built-in.
        let servers = vec![
            fake_server("a", &["b_c", "d"]).await,
            fake_server("a_b", &["c"]).await,
            fake_server("search", &["knowledge_base"]).await,
        ];
        let registry = registry(servers, &dir).await;
        let tools = registry.aggregate();

        let mut seen = HashSet::new();
        for d in &tools {
            assert!(seen.insert(d.name.clone()), "duplicate {}", d.name);
        }
        assert_eq!(tools.iter().filter(|d| d.name == "a_b_c").count(), 1);
        assert!(!tools.iter().any(|d| d.origin
            == ToolOrigin::External {
                server: "search".into()
            }));

        for d in &tools {
            if let ToolOrigin::External { server } = &d.origin {
                let (resolved_server, tool) = registry.resolve(&d.name).unwrap();
                assert_eq!(&resolved_server, server);
                assert_eq!(namespaced(&resolved_server, &tool), d.name);
            }
        }
        assert_eq!(registry.resolve("a_b_c"), Some(("a_b".into(), "c".into())));
        assert_eq!(registry.resolve("a_d"), Some(("a".into(), "d".into())));
    }

    #[tokio::test]
    async fn test_resolve_edge_cases() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(vec![fake_server("github", &["list_repos"]).await], &dir).await;

        assert_eq!(registry.resolve("github_"), None);
        assert_eq!(registry.resolve("github"), None);
        assert_eq!(registry.resolve("gitlab_list_repos"), None);
        assert_eq!(registry.resolve("githublist_repos"), None);
        // Unlisted remainder still goes to the server, which reports it.
        assert_eq!(
            registry.resolve("github_delete_repo"),
            Some(("github".into(), "delete_repo".into()))
        );
    }

    #[tokio::test]
    async fn test_route_priority() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(vec![fake_server("send", &["message"]).await], &dir).await;

        assert!(matches!(registry.route("search_knowledge_base"), ToolRoute::BuiltIn(_)));
        // The action wins over the server tool with the same published name.
        assert!(matches!(registry.route("send_message"), ToolRoute::ChannelAction(_)));
        assert!(matches!(registry.route("nope"), ToolRoute::Unknown));
        assert!(!registry.aggregate().iter().any(|d| matches!(d.origin, ToolOrigin::External { .. })));
    }

    #[tokio::test]
    async fn test_dead_servers_leave_the_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(vec![fake_server("github", &["list_repos", "crash"]).await], &dir).await;
        assert!(registry.resolve("github_list_repos").is_some());

        let _ = registry.servers().call_tool("github", "crash", serde_json::json!({})).await;
        assert!(registry.servers().live_names().is_empty());
        assert_eq!(registry.resolve("github_list_repos"), None);
        assert_eq!(registry.aggregate().len(), 9);
    }

    #[tokio::test]
    async fn test_action_cannot_shadow_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = ToolRegistry::new(Arc::new(ToolServers::empty()));
        assert!(registry.register_builtin(knowledge_tool(&dir)));
        assert!(!registry.register_action(knowledge_tool(&dir)));
        assert_eq!(registry.aggregate().len(), 1);
    }
}
