//! A live node of the agent hierarchy.
//!
//! Agents do not own each other directly: the [`Hierarchy`](crate::tree::Hierarchy)
//! arena owns every agent, and `parent_id`/`child_ids` are plain identifiers.
//! The parent link is only used for upward traversal.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::core::role::RoleDefinition;
use crate::io::env::RuntimeEnv;

/// One entry of an agent's conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RuntimeAgent {
    id: String,
    role: Arc<RoleDefinition>,
    parent_id: Option<String>,
    child_ids: Vec<String>,
    session_id: String,
    messages: Vec<Message>,
    context: BTreeMap<String, Value>,
    env: RuntimeEnv,
}

impl RuntimeAgent {
    /// Create an agent with a fresh id. A root mints the session id; a child
    /// inherits its parent's.
    pub(crate) fn new(
        role: Arc<RoleDefinition>,
        parent: Option<&RuntimeAgent>,
        env: RuntimeEnv,
    ) -> Self {
        let id = env.ids.next_id();
        let session_id = match parent {
            Some(parent) => parent.session_id.clone(),
            None => env.ids.next_id(),
        };
        Self {
            id,
            role,
            parent_id: parent.map(|p| p.id.clone()),
            child_ids: Vec::new(),
            session_id,
            messages: Vec::new(),
            context: BTreeMap::new(),
            env,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Role name this agent was instantiated from.
    pub fn name(&self) -> &str {
        self.role.name()
    }

    pub fn role(&self) -> &Arc<RoleDefinition> {
        &self.role
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn child_ids(&self) -> &[String] {
        &self.child_ids
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub(crate) fn push_child(&mut self, child_id: String) {
        self.child_ids.push(child_id);
    }

    /// Append to the conversation log, stamped by the injected clock.
    pub fn add_message(&mut self, role: impl Into<String>, content: impl Into<String>) -> &Message {
        let timestamp = self.env.clock.now();
        self.messages.push(Message {
            role: role.into(),
            content: content.into(),
            timestamp,
        });
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn set_context(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.context.insert(key.into(), value)
    }

    pub fn context(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    pub fn context_map(&self) -> &BTreeMap<String, Value> {
        &self.context
    }
}
