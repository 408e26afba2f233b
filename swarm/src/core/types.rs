//! Process-wide constants shared by role validation and permission checks.
//!
//! These sets are fixed at compile time and never mutated; they do not depend
//! on any loaded configuration.

/// Providers a role may declare.
pub const VALID_PROVIDERS: [&str; 3] = ["anthropic", "openai", "google"];

/// Tools every role may use unless it explicitly disallows them.
pub const DEFAULT_ALLOWED_TOOLS: [&str; 6] = ["Read", "Glob", "LS", "Grep", "TodoWrite", "Task"];

/// The only configuration version this crate understands.
pub const SUPPORTED_VERSION: i64 = 2;

/// Working directory used when a role omits `directory`.
pub const DEFAULT_DIRECTORY: &str = ".";

pub fn is_valid_provider(provider: &str) -> bool {
    VALID_PROVIDERS.contains(&provider)
}

pub fn is_default_tool(tool: &str) -> bool {
    DEFAULT_ALLOWED_TOOLS.contains(&tool)
}
