//! Immutable per-role definitions parsed from raw agent configuration.
//!
//! Construction never fails: every problem found while parsing or validating
//! is recorded as a human-readable error on the definition itself.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_yaml::Value;

use crate::core::types::{DEFAULT_DIRECTORY, VALID_PROVIDERS, is_default_tool, is_valid_provider};
use crate::core::value::{describe, mapping_entries, text};

/// One allow/deny list entry, resolved from either a bare tool name or a
/// `{tool, matcher}` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolPermission {
    pub name: String,
    pub matcher: Option<String>,
}

/// Shapes a tool entry may take in raw configuration.
enum ToolEntry<'a> {
    Bare(&'a str),
    Record { tool: String, matcher: Option<String> },
}

impl ToolEntry<'_> {
    fn into_permission(self) -> ToolPermission {
        match self {
            ToolEntry::Bare(name) => ToolPermission {
                name: name.to_string(),
                matcher: None,
            },
            ToolEntry::Record { tool, matcher } => ToolPermission {
                name: tool,
                matcher,
            },
        }
    }
}

/// A named sub-server declaration (`mcp_servers` entry).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct McpServer {
    pub name: String,
    pub server_type: Option<String>,
    pub config: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleDefinition {
    name: String,
    description: Option<String>,
    provider: Option<String>,
    model: Option<String>,
    directory: String,
    system_prompt: Option<String>,
    allowed_tools: Vec<ToolPermission>,
    disallowed_tools: Vec<ToolPermission>,
    reports: Vec<String>,
    hooks: BTreeMap<String, Value>,
    mcp_servers: Vec<McpServer>,
    errors: Vec<String>,
}

impl RoleDefinition {
    /// Parse and validate one role. A non-mapping `raw` is treated as empty.
    pub fn new(name: impl Into<String>, raw: &Value) -> Self {
        let name = name.into();
        let mut errors = Vec::new();

        let allowed_tools = parse_tools(raw.get("allowed_tools"), &mut errors);
        let disallowed_tools = parse_tools(raw.get("disallowed_tools"), &mut errors);

        let directory = match raw.get("directory") {
            None | Some(Value::Null) => DEFAULT_DIRECTORY.to_string(),
            Some(value) => text(value).unwrap_or_default(),
        };

        let hooks = mapping_entries(raw.get("hooks"))
            .into_iter()
            .map(|(key, value)| (key, value.clone()))
            .collect();

        let mcp_servers = mapping_entries(raw.get("mcp_servers"))
            .into_iter()
            .map(|(server, config)| McpServer {
                server_type: config.get("type").and_then(text),
                name: server,
                config: config.clone(),
            })
            .collect();

        let mut role = Self {
            description: raw.get("description").and_then(text),
            provider: raw.get("provider").and_then(text),
            model: raw.get("model").and_then(text),
            directory,
            system_prompt: raw.get("system_prompt").and_then(text),
            allowed_tools,
            disallowed_tools,
            reports: parse_reports(raw.get("reports")),
            hooks,
            mcp_servers,
            name,
            errors,
        };
        role.validate(raw);
        role
    }

    fn validate(&mut self, raw: &Value) {
        let required = [
            ("description", &self.description),
            ("provider", &self.provider),
            ("model", &self.model),
        ];
        for (field, value) in required {
            if value.as_deref().is_none_or(str::is_empty) {
                self.errors.push(format!(
                    "Agent '{}' missing required field: {}",
                    self.name, field
                ));
            }
        }

        if let Some(provider) = self.provider.as_deref()
            && !provider.is_empty()
            && !is_valid_provider(provider)
        {
            self.errors.push(format!(
                "Agent '{}' has invalid provider '{}'. Must be one of: {}",
                self.name,
                provider,
                VALID_PROVIDERS.join(", ")
            ));
        }

        // Shape is checked against the raw value: `type` must be a key of a mapping.
        for (server, config) in mapping_entries(raw.get("mcp_servers")) {
            let has_type = config.as_mapping().is_some_and(|m| m.contains_key("type"));
            if !has_type {
                self.errors.push(format!(
                    "MCP server '{}' in agent '{}' must have a 'type' field",
                    server, self.name
                ));
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Working directory; `"."` when the key was absent, possibly empty when set so.
    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn allowed_tools(&self) -> &[ToolPermission] {
        &self.allowed_tools
    }

    pub fn disallowed_tools(&self) -> &[ToolPermission] {
        &self.disallowed_tools
    }

    /// Names of subordinate roles, unresolved.
    pub fn reports(&self) -> &[String] {
        &self.reports
    }

    pub fn hooks(&self) -> &BTreeMap<String, Value> {
        &self.hooks
    }

    pub fn mcp_servers(&self) -> &[McpServer] {
        &self.mcp_servers
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Disallowed entries win over both the default set and the allow list.
    pub fn can_use_tool(&self, tool: &str) -> bool {
        if self.disallowed_tools.iter().any(|t| t.name == tool) {
            return false;
        }
        if is_default_tool(tool) {
            return true;
        }
        self.allowed_tools.iter().any(|t| t.name == tool)
    }
}

fn parse_tools(raw: Option<&Value>, errors: &mut Vec<String>) -> Vec<ToolPermission> {
    let Some(Value::Sequence(entries)) = raw else {
        return Vec::new();
    };

    let mut tools = Vec::with_capacity(entries.len());
    for entry in entries {
        match classify_tool(entry) {
            Some(tool) => tools.push(tool.into_permission()),
            None => errors.push(format!("Invalid tool configuration: {}", describe(entry))),
        }
    }
    tools
}

fn classify_tool(entry: &Value) -> Option<ToolEntry<'_>> {
    match entry {
        Value::String(name) => Some(ToolEntry::Bare(name)),
        Value::Mapping(map) => {
            let tool = map.get("tool").and_then(text)?;
            Some(ToolEntry::Record {
                tool,
                matcher: map.get("matcher").and_then(text),
            })
        }
        _ => None,
    }
}

/// `reports` accepts a list of names or a single name.
fn parse_reports(raw: Option<&Value>) -> Vec<String> {
    match raw {
        Some(Value::Sequence(items)) => items.iter().filter_map(text).collect(),
        Some(value) => text(value).into_iter().collect(),
        None => Vec::new(),
    }
}
