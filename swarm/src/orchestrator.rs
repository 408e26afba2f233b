//! Builds, validates and instantiates an agent hierarchy from configuration.
//!
//! Lifecycle:
//! 1. Construction parses the document into [`RoleDefinition`]s and validates
//!    the whole graph. Problems are collected, never returned as errors; a
//!    document that cannot be parsed still gets validated, so its unset
//!    fields are reported too.
//! 2. [`SwarmOrchestrator::start`] runs the `before` commands in order, then
//!    instantiates the leader and, depth-first, one agent per declared report.
//! 3. Callers query or extend the live tree with `spawn_agent`, `find_agent`
//!    and `agent_tree`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, bail};
use serde_yaml::Value;
use tracing::{debug, info, warn};

use crate::agent::RuntimeAgent;
use crate::core::invariants::{RoleMap, validate_graph};
use crate::core::role::RoleDefinition;
use crate::core::types::SUPPORTED_VERSION;
use crate::core::value::{describe, mapping_entries, text};
use crate::io::config::{load_document, parse_document};
use crate::io::env::RuntimeEnv;
use crate::io::process::{CommandRunner, CommandSpec, ProcessExecutor};
use crate::tree::{AgentRecord, AgentTreeNode, Hierarchy};

#[derive(Debug, Default)]
pub struct SwarmOrchestrator {
    env: RuntimeEnv,
    errors: Vec<String>,
    version: Option<Value>,
    name: Option<String>,
    leader_name: Option<String>,
    before: Vec<String>,
    roles: RoleMap,
    hierarchy: Hierarchy,
    leader_id: Option<String>,
    started: bool,
}

impl SwarmOrchestrator {
    /// Parse and validate an already-deserialized document.
    pub fn new(document: &Value) -> Self {
        let mut orchestrator = Self::default();
        orchestrator.parse(document);
        orchestrator.validate();
        orchestrator
    }

    /// Parse YAML text. A syntax error leaves every field at its default and
    /// records a `YAML syntax error` entry ahead of the validation errors.
    pub fn from_yaml_str(text: &str) -> Self {
        match parse_document(text) {
            Ok(document) => Self::new(&document),
            Err(err) => Self::syntax_error(&format!("{err:#}")),
        }
    }

    pub fn from_path(path: &Path) -> Self {
        match load_document(path) {
            Ok(document) => Self::new(&document),
            Err(err) => Self::syntax_error(&format!("{err:#}")),
        }
    }

    fn syntax_error(message: &str) -> Self {
        warn!(error = %message, "swarm config could not be parsed");
        let mut orchestrator = Self {
            errors: vec![format!("YAML syntax error: {message}")],
            ..Self::default()
        };
        orchestrator.validate();
        orchestrator
    }

    /// Replace the identifier/clock strategies used for agents created later.
    pub fn with_env(mut self, env: RuntimeEnv) -> Self {
        self.env = env;
        self
    }

    /// A document that is not a mapping leaves every field unset.
    fn parse(&mut self, document: &Value) {
        if !document.is_mapping() {
            let message = "Invalid YAML structure: must be a Hash";
            warn!(error = message, "swarm config rejected");
            self.errors.push(message.to_string());
            return;
        }

        self.version = document.get("version").filter(|v| !v.is_null()).cloned();

        let swarm = document.get("swarm");
        let field = |key| section_field(swarm, key);

        self.name = field("name").and_then(text);
        self.leader_name = field("leader").and_then(text);
        self.before = match field("before") {
            Some(Value::Sequence(items)) => items.iter().filter_map(text).collect(),
            Some(value) => text(value).into_iter().collect(),
            None => Vec::new(),
        };

        for (name, raw) in mapping_entries(field("agents")) {
            let role = RoleDefinition::new(name.clone(), raw);
            if role.is_valid() {
                debug!(role = %name, "role parsed");
                self.roles.insert(name, Arc::new(role));
            } else {
                warn!(role = %name, errors = role.errors().len(), "role is invalid");
                self.errors.extend(role.errors().iter().cloned());
            }
        }
    }

    /// Document- and graph-level checks; every failing check is reported.
    fn validate(&mut self) {
        match &self.version {
            None => self.errors.push("version is required".to_string()),
            Some(version) if !is_supported_version(version) => {
                let shown = text(version).unwrap_or_else(|| describe(version));
                self.errors
                    .push(format!("Only version {SUPPORTED_VERSION} is supported, got: {shown}"));
            }
            Some(_) => {}
        }

        if self.name.as_deref().is_none_or(str::is_empty) {
            self.errors.push("swarm.name is required".to_string());
        }

        let graph_errors = validate_graph(&self.roles, self.leader_name.as_deref());
        self.errors.extend(graph_errors);

        if !self.errors.is_empty() {
            warn!(errors = self.errors.len(), "swarm config is invalid");
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn version(&self) -> Option<&Value> {
        self.version.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn leader_name(&self) -> Option<&str> {
        self.leader_name.as_deref()
    }

    pub fn before_commands(&self) -> &[String] {
        &self.before
    }

    /// Valid roles only; invalid definitions never join the graph.
    pub fn role(&self, name: &str) -> Option<&Arc<RoleDefinition>> {
        self.roles.get(name)
    }

    /// Roles ordered by name.
    pub fn roles(&self) -> impl Iterator<Item = &Arc<RoleDefinition>> {
        self.roles.values()
    }

    /// Run `before` commands through the process executor, then build the tree.
    pub fn start(&mut self) -> bool {
        self.start_with(&ProcessExecutor)
    }

    /// Like [`start`](Self::start) with a caller-supplied command runner.
    ///
    /// A second call after a successful start is a no-op returning true.
    pub fn start_with<R: CommandRunner + ?Sized>(&mut self, runner: &R) -> bool {
        if !self.is_valid() {
            warn!("refusing to start an invalid swarm");
            return false;
        }
        if self.started {
            debug!("swarm already started");
            return true;
        }

        info!(swarm = ?self.name, commands = self.before.len(), "starting swarm");
        if let Err(err) = self.run_before_commands(runner) {
            let message = format!("Failed to start swarm: {err:#}");
            warn!(error = %message, "swarm start aborted");
            self.errors.push(message);
            return false;
        }

        if let Some(leader) = self.leader_name.clone() {
            self.leader_id = self.instantiate(&leader, None);
        }
        self.started = true;
        info!(agents = self.hierarchy.len(), "swarm started");
        true
    }

    fn run_before_commands<R: CommandRunner + ?Sized>(&self, runner: &R) -> Result<()> {
        for command in &self.before {
            debug!(command = %command, "running before command");
            let result = runner.run(&CommandSpec::Shell(command.clone()), None)?;
            if !result.success() {
                let stderr = result.stderr().trim();
                let detail = if stderr.is_empty() {
                    String::new()
                } else {
                    format!(": {stderr}")
                };
                bail!(
                    "Before command failed: {command} (exit status {}){detail}",
                    result.exit_status()
                );
            }
        }
        Ok(())
    }

    /// Depth-first: the agent for `role_name`, then one per declared report.
    /// Unknown role names are skipped.
    fn instantiate(&mut self, role_name: &str, parent_id: Option<&str>) -> Option<String> {
        let role = Arc::clone(self.roles.get(role_name)?);
        let id = self
            .hierarchy
            .spawn(Arc::clone(&role), parent_id, &self.env)?
            .id()
            .to_string();
        debug!(role = %role_name, id = %id, parent = ?parent_id, "agent instantiated");

        for subordinate in role.reports() {
            self.instantiate(subordinate, Some(&id));
        }
        Some(id)
    }

    /// Add an agent of an already-defined role.
    ///
    /// The parent defaults to the leader instance; with no leader the new agent
    /// is a root. Returns `None` for an unknown role or an unknown parent id.
    pub fn spawn_agent(&mut self, role_name: &str, parent_id: Option<&str>) -> Option<&RuntimeAgent> {
        let Some(role) = self.roles.get(role_name).cloned() else {
            debug!(role = %role_name, "spawn requested for unknown role");
            return None;
        };
        let parent = parent_id
            .map(str::to_string)
            .or_else(|| self.leader_id.clone());
        self.hierarchy.spawn(role, parent.as_deref(), &self.env)
    }

    pub fn find_agent(&self, id: &str) -> Option<&RuntimeAgent> {
        self.hierarchy.get(id)
    }

    pub fn find_agent_mut(&mut self, id: &str) -> Option<&mut RuntimeAgent> {
        self.hierarchy.get_mut(id)
    }

    /// The leader's runtime instance, once started.
    pub fn leader(&self) -> Option<&RuntimeAgent> {
        self.leader_id.as_deref().and_then(|id| self.hierarchy.get(id))
    }

    pub fn active_count(&self) -> usize {
        self.hierarchy.len()
    }

    /// Active agents in creation order.
    pub fn agents(&self) -> impl Iterator<Item = &RuntimeAgent> {
        self.hierarchy.iter()
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    /// Nested view rooted at the leader instance.
    pub fn agent_tree(&self) -> Option<AgentTreeNode> {
        self.hierarchy.tree(self.leader_id.as_deref()?)
    }

    pub fn record(&self, id: &str) -> Option<AgentRecord> {
        self.hierarchy.record(id)
    }
}

/// A missing or non-mapping `swarm` section reads as empty.
fn section_field<'a>(swarm: Option<&'a Value>, key: &str) -> Option<&'a Value> {
    swarm.and_then(|section| section.get(key))
}

fn is_supported_version(version: &Value) -> bool {
    match version {
        Value::Number(n) => {
            n.as_i64() == Some(SUPPORTED_VERSION) || n.as_f64() == Some(SUPPORTED_VERSION as f64)
        }
        _ => false,
    }
}
