//! switchmgrd - Open vSwitch bridge and port configuration manager
//!
//! Converges bridges, ports and their tap devices on an Open vSwitch host
//! with a desired configuration, tracking what it manages in a local state
//! file and recreating objects that drifted away.

pub mod adapter;
pub mod apply;
pub mod bridge;
pub mod client;
pub mod commands;
pub mod config;
pub mod id;
pub mod port;
pub mod state;
pub mod types;

pub use adapter::{InterfaceAdapter, SwitchAdapter};
pub use apply::{plan, Orchestrator, Plan, RefreshReport, Step};
pub use bridge::BridgeReconciler;
pub use client::{current_user, ClientOptions, OvsClient};
pub use config::{DesiredState, SwitchConfig};
pub use port::PortReconciler;
pub use state::{StateStore, TrackedState};
pub use types::*;
