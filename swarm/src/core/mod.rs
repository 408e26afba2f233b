//! Deterministic, pure logic: role parsing, validation and graph checks.
//!
//! Core modules are free of I/O. They operate on in-memory configuration
//! values and return deterministic outputs suitable for tests.

pub mod invariants;
pub mod role;
pub mod types;
pub mod value;
