//! Test infrastructure for the Open vSwitch configuration manager
//!
//! Provides:
//! - An in-memory fake switch with call log and failure injection
//! - Spec fixtures for common bridge/port layouts
//! - Call log and switch content verification helpers

pub mod fake;
pub mod fixtures;
mod verification;

pub use fake::{Call, FakeSwitch, Op};
pub use fixtures::*;
pub use verification::*;
