//! Test-only helpers: deterministic strategies, scripted runners, role fixtures.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde_yaml::{Mapping, Value};

use crate::core::role::RoleDefinition;
use crate::io::env::{Clock, IdGenerator, RuntimeEnv};
use crate::io::process::{CommandResult, CommandRunner, CommandSpec};

/// Yields `id-1`, `id-2`, ... in call order.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicUsize,
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        format!("id-{n}")
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Default for FixedClock {
    fn default() -> Self {
        Self(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Sequential ids and a fixed clock.
pub fn deterministic_env() -> RuntimeEnv {
    RuntimeEnv::new(Arc::new(SequentialIds::default()), Arc::new(FixedClock::default()))
}

/// Command runner that replays queued results and records what it was asked
/// to run. Once the queue is empty every command succeeds.
#[derive(Default)]
pub struct ScriptedRunner {
    responses: RefCell<VecDeque<Result<CommandResult>>>,
    commands: RefCell<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new(responses: Vec<Result<CommandResult>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            commands: RefCell::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &CommandSpec, _workdir: Option<&Path>) -> Result<CommandResult> {
        self.commands.borrow_mut().push(command.to_string());
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(CommandResult::new("", "", 0)))
    }
}

/// A valid role with the given subordinate names.
pub fn role_with_reports(name: &str, reports: &[&str]) -> RoleDefinition {
    let mut raw = Mapping::new();
    raw.insert("description".into(), format!("{name} role").into());
    raw.insert("provider".into(), "anthropic".into());
    raw.insert("model".into(), "test-model".into());
    raw.insert(
        "reports".into(),
        Value::Sequence(reports.iter().map(|r| Value::from(*r)).collect()),
    );
    RoleDefinition::new(name, &Value::Mapping(raw))
}
