//! Identifier and clock strategies injected into runtime agents.
//!
//! Production code uses [`RuntimeEnv::default`] (random UUIDs, wall clock).
//! Tests swap in deterministic implementations from `test_support`.

use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Source of agent and session identifiers.
pub trait IdGenerator: Debug + Send + Sync {
    fn next_id(&self) -> String;
}

/// Source of message timestamps.
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Strategies shared by every agent created from one orchestrator.
#[derive(Debug, Clone)]
pub struct RuntimeEnv {
    pub ids: Arc<dyn IdGenerator>,
    pub clock: Arc<dyn Clock>,
}

impl RuntimeEnv {
    pub fn new(ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self { ids, clock }
    }
}

impl Default for RuntimeEnv {
    fn default() -> Self {
        Self::new(Arc::new(UuidGenerator), Arc::new(SystemClock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_generator_yields_distinct_ids() {
        let ids = UuidGenerator;
        let a = ids.next_id();
        let b = ids.next_id();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }
}
