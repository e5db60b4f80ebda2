//! Adapter traits over the switch control plane and the host.
//!
//! The reconcilers only talk to these traits. [`crate::client::OvsClient`]
//! implements both against the Open vSwitch command line tools.

use async_trait::async_trait;
use ovs_cfgmgr_common::CfgMgrResult;

use crate::types::{PortAction, ProtocolVersion};

/// Bridge and port primitives of the switch control plane.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SwitchAdapter: Send + Sync {
    /// Creates a bridge. Creating an existing bridge is not an error.
    async fn add_bridge(&self, bridge: &str) -> CfgMgrResult<()>;

    /// Restricts the OpenFlow versions a bridge accepts.
    async fn set_bridge_protocols(
        &self,
        bridge: &str,
        protocols: &[ProtocolVersion],
    ) -> CfgMgrResult<()>;

    /// Deletes a bridge and every port on it.
    async fn delete_bridge(&self, bridge: &str) -> CfgMgrResult<()>;

    /// Returns whether a bridge exists. Errors mean the query itself failed.
    async fn bridge_exists(&self, bridge: &str) -> CfgMgrResult<bool>;

    /// Attaches a port to a bridge.
    async fn add_port(&self, bridge: &str, port: &str) -> CfgMgrResult<()>;

    /// Detaches a port from a bridge.
    async fn delete_port(&self, bridge: &str, port: &str) -> CfgMgrResult<()>;

    /// Lists the ports attached to a bridge.
    async fn list_ports(&self, bridge: &str) -> CfgMgrResult<Vec<String>>;

    /// Applies an operational action to a port.
    async fn set_port_action(&self, bridge: &str, port: &str, action: PortAction)
        -> CfgMgrResult<()>;
}

/// OS-level virtual interfaces shadowing switch ports.
///
/// Both operations are best effort; callers log failures and carry on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InterfaceAdapter: Send + Sync {
    /// Creates a tap device owned by `owner`.
    async fn create_virtual_interface(&self, name: &str, owner: &str) -> CfgMgrResult<()>;

    /// Removes a tap device.
    async fn delete_virtual_interface(&self, name: &str) -> CfgMgrResult<()>;
}
