//! YAML front-end for swarm configuration documents.
//!
//! The orchestrator only consumes the generic [`Value`]; these helpers turn
//! text or files into one.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_yaml::Value;
use tracing::debug;

/// Parse YAML text into a generic value.
pub fn parse_document(text: &str) -> Result<Value> {
    let value: Value = serde_yaml::from_str(text)?;
    Ok(value)
}

/// Read and parse a configuration file.
pub fn load_document(path: &Path) -> Result<Value> {
    debug!(path = %path.display(), "loading swarm config");
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_document(&contents).with_context(|| format!("parse {}", path.display()))
}
