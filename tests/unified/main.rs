//! Unified Runner Tests
//!
//! End-to-end tests that load unified-format files and run them against the
//! in-memory driver:
//! - crud: operations, results, expected errors and outcomes
//! - schema: schema version gating
//! - requirements: runOnRequirements, skipReason and the config skip lists
//! - events: expectEvents verification
//! - lifecycle: entities, sessions, fail points and teardown

mod common;

mod crud;
mod events;
mod lifecycle;
mod requirements;
mod schema;
