//! Declarative workflow files.
//!
//! A workflow file is TOML:
//!
//! ```toml
//! entry = "triage"
//! max_steps = 6
//!
//! [[agents]]
//! id = "triage"
//! kind = "model"
//! instructions = "Route the question to the right specialist."
//!
//! [[agents]]
//! id = "billing"
//! kind = "tools"
//! tools = ["get_current_date_time"]
//!
//! [[edges]]
//! source = "triage"
//! target = "billing"
//! guard = { contains = "invoice" }
//! ```
//!
//! Tools agents can also pull tools from MCP servers declared once per file:
//!
//! ```toml
//! [[mcp_servers]]
//! name = "github"
//! url = "https://api.githubcopilot.com/mcp/"
//! headers = { Authorization = "Bearer ${GITHUB_PAT}" }
//! ```

use super::builder::WorkflowBuilder;
use super::engine::Workflow;
use super::graph::{Edge, Guard};
use crate::agent::{
    AgentCapability, AgentEntry, DelegatingAgent, Exhaustion, ModelAgent, ScriptedAgent,
    ToolAgent,
};
use crate::config::Config;
use crate::conversation::Message;
use crate::error::WorkflowError;
use crate::providers::{self, Provider, ReasoningEffort};
use crate::tools::mcp::{HttpConnector, McpConnector, McpServerConfig};
use crate::tools::{self, Tool};
use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WorkflowDefinition {
    pub entry: String,
    /// Falls back to `[workflow] max_steps` from the config.
    #[serde(default)]
    pub max_steps: Option<usize>,
    #[serde(default)]
    pub step_timeout_secs: Option<u64>,
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Model,
    Tools,
    Delegate,
    Scripted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AgentSpec {
    pub id: String,
    pub kind: AgentKind,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Model override; defaults to `default_model`.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Built-in tool names (`kind = "tools"`).
    #[serde(default)]
    pub tools: Vec<String>,
    /// MCP servers whose tools join `tools` (`kind = "tools"`).
    #[serde(default)]
    pub mcp_servers: Vec<String>,
    /// Ids of agents exposed as tools (`kind = "delegate"`).
    #[serde(default)]
    pub delegates: Vec<String>,
    /// Canned replies (`kind = "scripted"`), replayed in order and cycled.
    #[serde(default)]
    pub replies: Vec<String>,
    #[serde(default)]
    pub stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EdgeSpec {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Taken only when the source agent explicitly requests it.
    #[serde(default)]
    pub handoff: bool,
    #[serde(default)]
    pub guard: Option<GuardSpec>,
}

/// Declarative edge guard. Every condition that is set must hold.
///
/// Text matching (`contains`, `not_contains`) is case-insensitive and runs
/// against [`Message::text`], so structured content matches on its JSON form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GuardSpec {
    #[serde(default)]
    pub contains: Option<String>,
    #[serde(default)]
    pub not_contains: Option<String>,
    /// Regular expression searched in the message text.
    #[serde(default)]
    pub matches: Option<String>,
    #[serde(default)]
    pub has_warnings: bool,
    #[serde(default)]
    pub no_warnings: bool,
    #[serde(default)]
    pub field_equals: Option<FieldEquals>,
    #[serde(default)]
    pub author: Option<String>,
}

/// JSON pointer comparison against structured content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FieldEquals {
    pub pointer: String,
    pub value: serde_json::Value,
}

fn invalid(detail: impl Into<String>) -> WorkflowError {
    WorkflowError::InvalidDefinition(detail.into())
}

impl GuardSpec {
    fn validate(&self) -> Result<(), WorkflowError> {
        if self.has_warnings && self.no_warnings {
            return Err(invalid("guard cannot require both has_warnings and no_warnings"));
        }
        if let Some(field) = &self.field_equals {
            if !field.pointer.is_empty() && !field.pointer.starts_with('/') {
                return Err(invalid(format!(
                    "field_equals pointer must start with '/': {}",
                    field.pointer
                )));
            }
        }
        self.regex().map(|_| ())
    }

    fn regex(&self) -> Result<Option<Regex>, WorkflowError> {
        self.matches
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| invalid(format!("invalid guard regex: {e}")))
    }

    pub fn compile(&self) -> Result<Guard, WorkflowError> {
        self.validate()?;
        let regex = self.regex()?;
        let spec = self.clone();
        Ok(Guard::new(move |message| spec.check(message, regex.as_ref())))
    }

    fn check(&self, message: &Message, regex: Option<&Regex>) -> bool {
        let text = message.text();
        let lowered = text.to_lowercase();

        if let Some(needle) = &self.contains {
            if !lowered.contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if let Some(needle) = &self.not_contains {
            if lowered.contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if let Some(regex) = regex {
            if !regex.is_match(&text) {
                return false;
            }
        }
        if self.has_warnings && !message.has_warnings() {
            return false;
        }
        if self.no_warnings && message.has_warnings() {
            return false;
        }
        if let Some(field) = &self.field_equals {
            let actual = message
                .structured_value()
                .and_then(|value| value.pointer(&field.pointer));
            if actual != Some(&field.value) {
                return false;
            }
        }
        if let Some(author) = &self.author {
            if message.author.as_deref() != Some(author.as_str()) {
                return false;
            }
        }
        true
    }
}

impl WorkflowDefinition {
    /// Parse and validate a TOML workflow definition.
    pub fn parse(source: &str) -> Result<Self, WorkflowError> {
        let definition: WorkflowDefinition =
            toml::from_str(source).map_err(|e| invalid(format!("parse error: {e}")))?;
        definition.validate()?;
        Ok(definition)
    }

    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let source = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read workflow file: {}", path.display()))?;
        Self::parse(&source)
            .with_context(|| format!("Invalid workflow file: {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.agents.is_empty() {
            return Err(invalid("workflow defines no agents"));
        }
        if self.max_steps == Some(0) {
            return Err(invalid("max_steps must be greater than 0"));
        }
        if self.step_timeout_secs == Some(0) {
            return Err(invalid("step_timeout_secs must be greater than 0"));
        }

        let mut kinds: HashMap<&str, AgentKind> = HashMap::new();
        for agent in &self.agents {
            if agent.id.trim().is_empty() {
                return Err(invalid("agent id must not be empty"));
            }
            if kinds.insert(agent.id.as_str(), agent.kind).is_some() {
                return Err(WorkflowError::DuplicateAgent {
                    id: agent.id.clone(),
                });
            }
        }
        if !kinds.contains_key(self.entry.as_str()) {
            return Err(WorkflowError::UnknownAgent {
                id: self.entry.clone(),
            });
        }

        let mut servers = HashSet::new();
        for server in &self.mcp_servers {
            if server.name.trim().is_empty() {
                return Err(invalid("MCP server name must not be empty"));
            }
            if !servers.insert(server.name.as_str()) {
                return Err(invalid(format!("duplicate MCP server '{}'", server.name)));
            }
            let scheme = reqwest::Url::parse(&server.url).map(|url| url.scheme().to_string());
            if !matches!(scheme.as_deref(), Ok("http" | "https")) {
                return Err(invalid(format!(
                    "MCP server '{}' needs an http(s) url, got '{}'",
                    server.name, server.url
                )));
            }
        }

        for agent in &self.agents {
            validate_agent(agent, &kinds, &servers)?;
        }

        let mut seen_edges = HashSet::new();
        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !kinds.contains_key(endpoint.as_str()) {
                    return Err(WorkflowError::UnknownAgent {
                        id: endpoint.clone(),
                    });
                }
            }
            if edge.handoff && edge.guard.is_some() {
                return Err(invalid(format!(
                    "handoff edge {} -> {} cannot have a guard",
                    edge.source, edge.target
                )));
            }
            if edge.handoff && !seen_edges.insert((edge.source.as_str(), edge.target.as_str())) {
                return Err(invalid(format!(
                    "duplicate handoff edge {} -> {}",
                    edge.source, edge.target
                )));
            }
            if let Some(guard) = &edge.guard {
                guard.validate()?;
            }
        }
        Ok(())
    }

    /// Build a runnable workflow, creating the configured provider when any
    /// agent needs a model and connecting to the MCP servers agents use.
    pub async fn into_workflow(self, config: &Config) -> anyhow::Result<Workflow> {
        self.into_workflow_with(config, &HttpConnector).await
    }

    pub async fn into_workflow_with(
        self,
        config: &Config,
        connector: &dyn McpConnector,
    ) -> anyhow::Result<Workflow> {
        self.validate()?;

        let mut remote: HashMap<String, Vec<Arc<dyn Tool>>> = HashMap::new();
        for server in &self.mcp_servers {
            if !self.agents.iter().any(|a| a.mcp_servers.contains(&server.name)) {
                continue;
            }
            let tools = connector.tools(server).await.with_context(|| {
                format!("Failed to load tools from MCP server '{}'", server.name)
            })?;
            tracing::info!(server = %server.name, count = tools.len(), "MCP tools loaded");
            remote.insert(server.name.clone(), tools);
        }

        let needs_model = self.agents.iter().any(|a| a.kind != AgentKind::Scripted);
        let provider: Option<Arc<dyn Provider>> = if needs_model {
            let provider = providers::create_provider(
                config.provider_name(),
                config.api_key.as_deref(),
                config.api_url.as_deref(),
            )?;
            Some(Arc::from(provider))
        } else {
            None
        };

        let mut built: HashMap<String, AgentEntry> = HashMap::new();
        // Delegates wrap other agents, so build them last.
        let (delegating, direct): (Vec<_>, Vec<_>) = self
            .agents
            .iter()
            .partition(|a| a.kind == AgentKind::Delegate);
        for spec in direct.into_iter().chain(delegating) {
            let capability = build_capability(spec, config, provider.as_ref(), &built, &remote)?;
            let mut entry = AgentEntry::new(spec.id.clone(), capability);
            if let Some(instructions) = &spec.instructions {
                entry = entry.with_instructions(instructions.clone());
            }
            if let Some(description) = &spec.description {
                entry = entry.with_description(description.clone());
            }
            built.insert(spec.id.clone(), entry);
        }

        let mut builder = WorkflowBuilder::new(self.entry.clone())
            .max_steps(self.max_steps.unwrap_or(config.workflow.max_steps));
        if let Some(secs) = self.step_timeout_secs.or(config.workflow.step_timeout_secs) {
            builder = builder.step_timeout(Duration::from_secs(secs));
        }
        for spec in &self.agents {
            if let Some(entry) = built.remove(&spec.id) {
                builder = builder.agent_entry(entry);
            }
        }
        for spec in self.edges {
            let mut edge = if spec.handoff {
                Edge::handoff(spec.source, spec.target)
            } else {
                Edge::new(spec.source, spec.target)
            };
            if let Some(label) = spec.label {
                edge = edge.with_label(label);
            }
            if let Some(guard) = &spec.guard {
                edge = edge.with_guard(guard.compile()?);
            }
            builder = builder.add(edge);
        }
        Ok(builder.build()?)
    }
}

fn validate_agent(
    agent: &AgentSpec,
    kinds: &HashMap<&str, AgentKind>,
    servers: &HashSet<&str>,
) -> Result<(), WorkflowError> {
    if let Some(temperature) = agent.temperature {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(invalid(format!(
                "agent '{}': temperature must be between 0.0 and 2.0",
                agent.id
            )));
        }
    }
    if !agent.mcp_servers.is_empty() && agent.kind != AgentKind::Tools {
        return Err(invalid(format!(
            "agent '{}': only tools agents can use mcp_servers",
            agent.id
        )));
    }
    if let Some(unknown) = agent
        .mcp_servers
        .iter()
        .find(|name| !servers.contains(name.as_str()))
    {
        return Err(invalid(format!(
            "agent '{}' uses unknown MCP server '{unknown}'",
            agent.id
        )));
    }
    match agent.kind {
        AgentKind::Scripted if agent.replies.is_empty() => Err(invalid(format!(
            "scripted agent '{}' needs at least one reply",
            agent.id
        ))),
        AgentKind::Tools => {
            if agent.tools.is_empty() && agent.mcp_servers.is_empty() {
                return Err(invalid(format!(
                    "tools agent '{}' lists no tools or mcp_servers",
                    agent.id
                )));
            }
            tools::tools_by_name(&agent.tools).map(|_| ())
        }
        AgentKind::Delegate => {
            if agent.delegates.is_empty() {
                return Err(invalid(format!(
                    "delegate agent '{}' lists no delegates",
                    agent.id
                )));
            }
            for delegate in &agent.delegates {
                match kinds.get(delegate.as_str()) {
                    None => {
                        return Err(WorkflowError::UnknownAgent {
                            id: delegate.clone(),
                        })
                    }
                    Some(AgentKind::Delegate) => {
                        return Err(invalid(format!(
                            "agent '{}' cannot delegate to delegating agent '{delegate}'",
                            agent.id
                        )))
                    }
                    Some(_) => {}
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn build_capability(
    spec: &AgentSpec,
    config: &Config,
    provider: Option<&Arc<dyn Provider>>,
    built: &HashMap<String, AgentEntry>,
    remote: &HashMap<String, Vec<Arc<dyn Tool>>>,
) -> anyhow::Result<Arc<dyn AgentCapability>> {
    if spec.kind == AgentKind::Scripted {
        let mut agent = ScriptedAgent::new(spec.replies.clone()).with_exhaustion(Exhaustion::Cycle);
        if let Some(description) = &spec.description {
            agent = agent.with_description(description.clone());
        }
        return Ok(Arc::new(agent));
    }

    let provider = provider.context("model agents require a provider")?;
    let mut model = ModelAgent::new(
        Arc::clone(provider),
        spec.model.as_deref().unwrap_or(config.model_name()),
    )
    .with_temperature(spec.temperature.unwrap_or(config.default_temperature))
    .with_reasoning_effort(spec.reasoning_effort)
    .streaming(spec.stream.unwrap_or(config.agent.stream));
    if let Some(description) = &spec.description {
        model = model.with_description(description.clone());
    }

    let capability: Arc<dyn AgentCapability> = if spec.kind == AgentKind::Tools {
        let mut agent_tools = tools::tools_by_name(&spec.tools)?;
        for server in &spec.mcp_servers {
            agent_tools.extend(remote.get(server).into_iter().flatten().cloned());
        }
        let mut names = HashSet::new();
        if let Some(duplicate) = agent_tools.iter().find(|tool| !names.insert(tool.name())) {
            return Err(invalid(format!(
                "agent '{}' has two tools named '{}'",
                spec.id,
                duplicate.name()
            ))
            .into());
        }
        Arc::new(
            ToolAgent::new(model, agent_tools)
                .with_max_iterations(config.agent.max_tool_iterations),
        )
    } else if spec.kind == AgentKind::Delegate {
        let delegates = spec
            .delegates
            .iter()
            .map(|id| {
                built
                    .get(id)
                    .cloned()
                    .ok_or_else(|| WorkflowError::UnknownAgent { id: id.clone() })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Arc::new(
            DelegatingAgent::new(model, delegates)
                .with_max_iterations(config.agent.max_tool_iterations),
        )
    } else {
        Arc::new(model)
    };
    Ok(capability)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Conversation, Role};
    use crate::tools::mcp::test_support::StaticConnector;
    use crate::tools::mcp::RemoteTool;
    use std::collections::BTreeMap;
    use crate::workflow::{CancelSignal, CollectingSink, RunStatus};

    const PIZZA: &str = r#"
entry = "order"
max_steps = 4

[[agents]]
id = "order"
kind = "scripted"
replies = ["large pepperoni with pineapple"]

[[agents]]
id = "stock"
kind = "scripted"
replies = ["out of pineapple"]

[[agents]]
id = "kitchen"
kind = "scripted"
replies = ["pizza is in the oven"]

[[edges]]
source = "order"
target = "stock"

[[edges]]
source = "stock"
target = "order"
label = "rework"
guard = { contains = "out of" }

[[edges]]
source = "stock"
target = "kitchen"
"#;

    #[test]
    fn parses_agents_and_edges() {
        let definition = WorkflowDefinition::parse(PIZZA).unwrap();
        assert_eq!(definition.entry, "order");
        assert_eq!(definition.agents.len(), 3);
        assert_eq!(definition.edges[1].label.as_deref(), Some("rework"));
        assert_eq!(
            definition.edges[1].guard.as_ref().unwrap().contains.as_deref(),
            Some("out of")
        );
    }

    #[test]
    fn rejects_edge_to_unknown_agent() {
        let source = r#"
entry = "a"
[[agents]]
id = "a"
kind = "scripted"
replies = ["x"]
[[edges]]
source = "a"
target = "ghost"
"#;
        let err = WorkflowDefinition::parse(source).unwrap_err();
        assert_eq!(err, WorkflowError::UnknownAgent { id: "ghost".into() });
    }

    #[test]
    fn rejects_duplicate_agent_ids() {
        let source = r#"
entry = "a"
[[agents]]
id = "a"
kind = "scripted"
replies = ["x"]
[[agents]]
id = "a"
kind = "scripted"
replies = ["y"]
"#;
        let err = WorkflowDefinition::parse(source).unwrap_err();
        assert_eq!(err, WorkflowError::DuplicateAgent { id: "a".into() });
    }

    #[test]
    fn rejects_unknown_fields_and_tools() {
        assert!(WorkflowDefinition::parse("entry = \"a\"\nbogus = 1\n").is_err());

        let source = r#"
entry = "a"
[[agents]]
id = "a"
kind = "tools"
tools = ["launch_rockets"]
"#;
        let err = WorkflowDefinition::parse(source).unwrap_err();
        assert!(err.to_string().contains("launch_rockets"));
    }

    #[test]
    fn rejects_bad_guard_regex() {
        let source = r#"
entry = "a"
[[agents]]
id = "a"
kind = "scripted"
replies = ["x"]
[[edges]]
source = "a"
target = "a"
guard = { matches = "(" }
"#;
        assert!(matches!(
            WorkflowDefinition::parse(source),
            Err(WorkflowError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn guard_conditions_combine() {
        let guard = GuardSpec {
            contains: Some("ORDER".into()),
            no_warnings: true,
            author: Some("order".into()),
            ..GuardSpec::default()
        }
        .compile()
        .unwrap();

        let clean = Message::agent("order placed").with_author("order");
        assert!(guard.accepts(&clean));
        assert!(!guard.accepts(&clean.clone().with_warning("stock", "pineapple")));
        assert!(!guard.accepts(&Message::agent("order placed").with_author("stock")));
    }

    #[test]
    fn field_equals_reads_structured_content() {
        let guard = GuardSpec {
            field_equals: Some(FieldEquals {
                pointer: "/intent".into(),
                value: serde_json::json!("MusicQuestion"),
            }),
            ..GuardSpec::default()
        }
        .compile()
        .unwrap();

        let music = Message::structured(Role::Agent, serde_json::json!({"intent": "MusicQuestion"}));
        let other = Message::structured(Role::Agent, serde_json::json!({"intent": "Other"}));
        assert!(guard.accepts(&music));
        assert!(!guard.accepts(&other));
        assert!(!guard.accepts(&Message::agent("MusicQuestion")));
    }

    #[tokio::test]
    async fn scripted_definition_runs_through_guarded_edges() {
        let workflow = WorkflowDefinition::parse(PIZZA)
            .unwrap()
            .into_workflow(&Config::default())
            .await
            .unwrap();
        assert_eq!(workflow.max_steps(), 4);

        let mut sink = CollectingSink::new();
        let result = workflow
            .run(
                Conversation::from_user("one pizza please"),
                &mut sink,
                &CancelSignal::never(),
            )
            .await;

        // order -> stock -> order (rework) -> stock, then the cap is hit.
        assert_eq!(result.status, RunStatus::Aborted);
        assert_eq!(result.steps, 4);
        let authors: Vec<_> = result
            .produced()
            .iter()
            .filter_map(|m| m.author.as_deref())
            .collect();
        assert_eq!(authors, vec!["order", "stock", "order", "stock"]);
    }

    #[tokio::test]
    async fn model_agents_build_against_local_provider() {
        let source = r#"
entry = "triage"
step_timeout_secs = 30

[[agents]]
id = "triage"
kind = "delegate"
delegates = ["upper"]

[[agents]]
id = "upper"
kind = "tools"
description = "Uppercases text"
tools = ["upper_case"]
"#;
        let mut config = Config::default();
        config.default_provider = Some("ollama".into());
        let workflow = WorkflowDefinition::parse(source)
            .unwrap()
            .into_workflow(&config)
            .await
            .unwrap();

        assert_eq!(workflow.entry(), "triage");
        assert_eq!(workflow.step_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(workflow.registry().ids().collect::<Vec<_>>(), vec!["triage", "upper"]);
        assert_eq!(workflow.registry().resolve("triage").unwrap().capability.name(), "delegate");
    }

    const WITH_MCP: &str = r#"
entry = "assistant"

[[mcp_servers]]
name = "github"
url = "https://api.example.com/mcp/"

[[mcp_servers]]
name = "unused"
url = "http://localhost:9/mcp"

[[agents]]
id = "assistant"
kind = "tools"
reasoning_effort = "low"
tools = ["get_current_date_time"]
mcp_servers = ["github"]
"#;

    fn remote(name: &str) -> RemoteTool {
        serde_json::from_value(serde_json::json!({ "name": name })).unwrap()
    }

    fn ollama_config() -> Config {
        let mut config = Config::default();
        config.default_provider = Some("ollama".into());
        config
    }

    #[test]
    fn parses_mcp_servers_and_reasoning_effort() {
        let definition = WorkflowDefinition::parse(WITH_MCP).unwrap();
        assert_eq!(definition.mcp_servers.len(), 2);
        assert_eq!(definition.mcp_servers[0].name, "github");
        let agent = &definition.agents[0];
        assert_eq!(agent.reasoning_effort, Some(ReasoningEffort::Low));
        assert_eq!(agent.mcp_servers, vec!["github"]);

        let bad_effort = WITH_MCP.replace("\"low\"", "\"extreme\"");
        assert!(WorkflowDefinition::parse(&bad_effort).is_err());
    }

    #[test]
    fn rejects_invalid_mcp_references() {
        let unknown = WITH_MCP.replace("mcp_servers = [\"github\"]", "mcp_servers = [\"gitlab\"]");
        let err = WorkflowDefinition::parse(&unknown).unwrap_err();
        assert!(err.to_string().contains("unknown MCP server 'gitlab'"));

        let duplicate = WITH_MCP.replace("name = \"unused\"", "name = \"github\"");
        let err = WorkflowDefinition::parse(&duplicate).unwrap_err();
        assert!(err.to_string().contains("duplicate MCP server"));

        let bad_url = WITH_MCP.replace("http://localhost:9/mcp", "ftp://localhost/mcp");
        assert!(WorkflowDefinition::parse(&bad_url).is_err());

        let model_agent = r#"
entry = "a"
[[mcp_servers]]
name = "github"
url = "https://api.example.com/mcp/"
[[agents]]
id = "a"
kind = "model"
mcp_servers = ["github"]
"#;
        let err = WorkflowDefinition::parse(model_agent).unwrap_err();
        assert!(err.to_string().contains("only tools agents"));
    }

    #[test]
    fn tools_agent_may_rely_on_mcp_alone() {
        let source = WITH_MCP.replace("tools = [\"get_current_date_time\"]\n", "");
        assert!(WorkflowDefinition::parse(&source).is_ok());
    }

    #[tokio::test]
    async fn mcp_tools_join_builtin_tools() {
        let connector = StaticConnector {
            tools: BTreeMap::from([(
                "github".to_string(),
                vec![remote("list_issues"), remote("get_issue")],
            )]),
        };
        // "unused" has no scripted tools, so connecting to it would fail.
        let workflow = WorkflowDefinition::parse(WITH_MCP)
            .unwrap()
            .into_workflow_with(&ollama_config(), &connector)
            .await
            .unwrap();
        assert_eq!(workflow.registry().resolve("assistant").unwrap().capability.name(), "tools");
    }

    #[tokio::test]
    async fn duplicate_tool_names_across_sources_are_rejected() {
        let connector = StaticConnector {
            tools: BTreeMap::from([("github".to_string(), vec![remote("get_current_date_time")])]),
        };
        let err = WorkflowDefinition::parse(WITH_MCP)
            .unwrap()
            .into_workflow_with(&ollama_config(), &connector)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("two tools named 'get_current_date_time'"));
    }

    #[tokio::test]
    async fn unreachable_mcp_server_fails_the_build() {
        let connector = StaticConnector {
            tools: BTreeMap::new(),
        };
        let err = WorkflowDefinition::parse(WITH_MCP)
            .unwrap()
            .into_workflow_with(&ollama_config(), &connector)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("MCP server 'github'"));
    }
}
