//! Side-effecting helpers: processes, files, identifiers and clocks.

pub mod config;
pub mod env;
pub mod process;
