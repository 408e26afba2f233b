//! Builds a validated, tree-shaped hierarchy of cooperating agent roles from a
//! declarative configuration, and runs the external commands it depends on.
//!
//! - **[`core`]**: Pure role parsing and graph validation. No I/O.
//! - **[`io`]**: Process execution, config loading, id/clock strategies.
//!
//! [`orchestrator`] ties them together: it validates a document, runs the
//! `before` commands through [`io::process`], and instantiates the runtime
//! [`tree`] of [`agent`]s.

pub mod agent;
pub mod core;
pub mod io;
pub mod logging;
pub mod orchestrator;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tree;

pub use crate::agent::{Message, RuntimeAgent};
pub use crate::core::role::{McpServer, RoleDefinition, ToolPermission};
pub use crate::io::env::RuntimeEnv;
pub use crate::io::process::{
    CommandResult, CommandRunner, CommandSpec, ProcessExecutor, StreamKind,
};
pub use crate::orchestrator::SwarmOrchestrator;
pub use crate::tree::{AgentRecord, AgentTreeNode, Hierarchy};
