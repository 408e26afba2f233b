//! Arena that owns every runtime agent and answers tree-shaped queries.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::agent::RuntimeAgent;
use crate::core::role::RoleDefinition;
use crate::io::env::RuntimeEnv;

/// Nested `{id, name, children}` view of a subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentTreeNode {
    pub id: String,
    pub name: String,
    pub children: Vec<AgentTreeNode>,
}

/// Flat snapshot of one agent for presentation layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    pub session_id: String,
    pub depth: usize,
    pub parent_id: Option<String>,
    pub child_ids: Vec<String>,
}

/// Flat id → agent index. Parents list their children in insertion order.
#[derive(Debug, Default)]
pub struct Hierarchy {
    agents: HashMap<String, RuntimeAgent>,
    order: Vec<String>,
}

impl Hierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register an agent of `role` under `parent_id`.
    ///
    /// Returns `None` when `parent_id` names an agent not in this hierarchy.
    pub fn spawn(
        &mut self,
        role: Arc<RoleDefinition>,
        parent_id: Option<&str>,
        env: &RuntimeEnv,
    ) -> Option<&RuntimeAgent> {
        let agent = match parent_id {
            Some(pid) => {
                let parent = self.agents.get(pid)?;
                RuntimeAgent::new(role, Some(parent), env.clone())
            }
            None => RuntimeAgent::new(role, None, env.clone()),
        };
        let id = agent.id().to_string();

        if let Some(pid) = parent_id
            && let Some(parent) = self.agents.get_mut(pid)
        {
            parent.push_child(id.clone());
        }

        self.order.push(id.clone());
        self.agents.insert(id.clone(), agent);
        self.agents.get(&id)
    }

    pub fn get(&self, id: &str) -> Option<&RuntimeAgent> {
        self.agents.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut RuntimeAgent> {
        self.agents.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// All agents in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &RuntimeAgent> {
        self.order.iter().filter_map(|id| self.agents.get(id))
    }

    pub fn parent(&self, id: &str) -> Option<&RuntimeAgent> {
        let parent_id = self.agents.get(id)?.parent_id()?;
        self.agents.get(parent_id)
    }

    pub fn children(&self, id: &str) -> Vec<&RuntimeAgent> {
        self.agents
            .get(id)
            .map(|agent| {
                agent
                    .child_ids()
                    .iter()
                    .filter_map(|child| self.agents.get(child))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ancestors from the immediate parent up to the root.
    pub fn ancestors(&self, id: &str) -> Vec<&RuntimeAgent> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(agent) = current {
            out.push(agent);
            current = self.parent(agent.id());
        }
        out
    }

    /// Number of hops to the root; the root itself is at depth 0.
    pub fn depth(&self, id: &str) -> usize {
        self.ancestors(id).len()
    }

    pub fn root_of(&self, id: &str) -> Option<&RuntimeAgent> {
        let agent = self.agents.get(id)?;
        Some(self.ancestors(id).pop().unwrap_or(agent))
    }

    /// Strict descendants in depth-first pre-order.
    pub fn descendants(&self, id: &str) -> Vec<&RuntimeAgent> {
        let mut out = Vec::new();
        self.collect_descendants(id, &mut out);
        out
    }

    fn collect_descendants<'a>(&'a self, id: &str, out: &mut Vec<&'a RuntimeAgent>) {
        for child in self.children(id) {
            out.push(child);
            self.collect_descendants(child.id(), out);
        }
    }

    pub fn tree(&self, id: &str) -> Option<AgentTreeNode> {
        let agent = self.agents.get(id)?;
        Some(AgentTreeNode {
            id: agent.id().to_string(),
            name: agent.name().to_string(),
            children: agent
                .child_ids()
                .iter()
                .filter_map(|child| self.tree(child))
                .collect(),
        })
    }

    pub fn record(&self, id: &str) -> Option<AgentRecord> {
        let agent = self.agents.get(id)?;
        Some(AgentRecord {
            id: agent.id().to_string(),
            name: agent.name().to_string(),
            session_id: agent.session_id().to_string(),
            depth: self.depth(id),
            parent_id: agent.parent_id().map(str::to_string),
            child_ids: agent.child_ids().to_vec(),
        })
    }
}
