//! Common infrastructure for the Open vSwitch configuration manager.
//!
//! This crate provides shared functionality for the switch reconcilers:
//!
//! - [`shell`]: Safe shell command execution with proper quoting
//! - [`Reconciler`]: Lifecycle trait implemented per resource kind
//! - [`TrackedResource`]: Persisted identity plus last-applied configuration
//! - [`error`]: Error types for cfgmgr operations
//!
//! # Architecture
//!
//! A reconciliation pass follows this pattern:
//!
//! 1. Load desired configuration and previously tracked state
//! 2. Read every tracked resource back from the switch (drift detection)
//! 3. Create, update, replace or delete resources in dependency order
//! 4. Persist the tracked records
//!
//! # Example
//!
//! ```ignore
//! use ovs_cfgmgr_common::{Reconciler, TrackedResource};
//!
//! let mut tracked = bridges.create(&spec).await?;
//! if !bridges.read(&mut tracked).await?.is_present() {
//!     // removed outside the tool; recreate on the next pass
//! }
//! ```

pub mod error;
pub mod resource;
pub mod shell;

// Re-export commonly used items at crate root
pub use error::{CfgMgrError, CfgMgrResult};
pub use resource::{
    defaults, Absence, Observed, Reconciler, ResourceSpec, ResourceState, TrackedResource,
};
