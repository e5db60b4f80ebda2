//! Type definitions for switchmgrd

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use ovs_cfgmgr_common::{defaults::ID_SEPARATOR, CfgMgrError, CfgMgrResult, ResourceSpec};

use crate::id;

/// OpenFlow protocol version negotiated by a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum ProtocolVersion {
    OpenFlow10,
    OpenFlow11,
    OpenFlow12,
    #[default]
    OpenFlow13,
    OpenFlow14,
    OpenFlow15,
}

impl ProtocolVersion {
    /// All supported versions, oldest first.
    pub const ALL: [ProtocolVersion; 6] = [
        ProtocolVersion::OpenFlow10,
        ProtocolVersion::OpenFlow11,
        ProtocolVersion::OpenFlow12,
        ProtocolVersion::OpenFlow13,
        ProtocolVersion::OpenFlow14,
        ProtocolVersion::OpenFlow15,
    ];

    /// Returns the name used by Open vSwitch.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::OpenFlow10 => "OpenFlow10",
            ProtocolVersion::OpenFlow11 => "OpenFlow11",
            ProtocolVersion::OpenFlow12 => "OpenFlow12",
            ProtocolVersion::OpenFlow13 => "OpenFlow13",
            ProtocolVersion::OpenFlow14 => "OpenFlow14",
            ProtocolVersion::OpenFlow15 => "OpenFlow15",
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolVersion {
    type Err = CfgMgrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| {
                CfgMgrError::invalid_config(
                    "protocol_version",
                    format!("'{}' is not one of OpenFlow10..OpenFlow15", s),
                )
            })
    }
}

/// Ordered set of protocol versions.
pub type ProtocolVersions = BTreeSet<ProtocolVersion>;

/// Parses protocol version names, falling back to OpenFlow13 when empty.
pub fn parse_protocol_versions<I, S>(names: I) -> CfgMgrResult<ProtocolVersions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut versions = ProtocolVersions::new();
    for name in names {
        versions.insert(name.as_ref().parse()?);
    }
    if versions.is_empty() {
        versions.insert(ProtocolVersion::default());
    }
    Ok(versions)
}

/// Operational action applied to a port with `ovs-ofctl mod-port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PortAction {
    #[default]
    Up,
    Down,
    Stp,
    NoStp,
    Receive,
    NoReceive,
    /// Drop received STP/802.1D frames. Configured and emitted as
    /// `no-receive-stp`.
    NoReceiveStp,
    Forward,
    NoForward,
    Flood,
    NoFlood,
    PacketIn,
    NoPacketIn,
}

impl PortAction {
    /// Every action, in configuration order.
    pub const ALL: [PortAction; 13] = [
        PortAction::Up,
        PortAction::Down,
        PortAction::Stp,
        PortAction::NoStp,
        PortAction::Receive,
        PortAction::NoReceive,
        PortAction::NoReceiveStp,
        PortAction::Forward,
        PortAction::NoForward,
        PortAction::Flood,
        PortAction::NoFlood,
        PortAction::PacketIn,
        PortAction::NoPacketIn,
    ];

    /// Convert to the configuration string and `mod-port` keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            PortAction::Up => "up",
            PortAction::Down => "down",
            PortAction::Stp => "stp",
            PortAction::NoStp => "no-stp",
            PortAction::Receive => "receive",
            PortAction::NoReceive => "no-receive",
            PortAction::NoReceiveStp => "no-receive-stp",
            PortAction::Forward => "forward",
            PortAction::NoForward => "no-forward",
            PortAction::Flood => "flood",
            PortAction::NoFlood => "no-flood",
            PortAction::PacketIn => "packet-in",
            PortAction::NoPacketIn => "no-packet-in",
        }
    }
}

impl fmt::Display for PortAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PortAction {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(port_action(s))
    }
}

/// Maps a configured action name to a [`PortAction`].
///
/// Matching is exact. Anything else, including case variants such as `"UP"`
/// and the empty string, maps to [`PortAction::Up`].
pub fn port_action(name: &str) -> PortAction {
    PortAction::ALL
        .iter()
        .copied()
        .find(|a| a.as_str() == name)
        .unwrap_or(PortAction::Up)
}

fn validate_name(field: &str, name: &str) -> CfgMgrResult<()> {
    if name.is_empty() {
        return Err(CfgMgrError::invalid_config(field, "must not be empty"));
    }
    if name.contains(ID_SEPARATOR) {
        return Err(CfgMgrError::invalid_config(
            field,
            format!("'{}' must not contain '{}'", name, ID_SEPARATOR),
        ));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(CfgMgrError::invalid_config(
            field,
            format!("'{}' must not contain whitespace", name),
        ));
    }
    Ok(())
}

/// Desired configuration of a bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSpec {
    /// Bridge name (identity)
    pub name: String,
    /// Protocols the bridge speaks
    pub protocol_versions: ProtocolVersions,
}

impl BridgeSpec {
    /// Create a validated bridge spec
    pub fn new(name: impl Into<String>, protocol_versions: ProtocolVersions) -> CfgMgrResult<Self> {
        let name = name.into();
        validate_name("name", &name)?;
        let protocol_versions = if protocol_versions.is_empty() {
            ProtocolVersions::from([ProtocolVersion::default()])
        } else {
            protocol_versions
        };
        Ok(Self {
            name,
            protocol_versions,
        })
    }
}

impl ResourceSpec for BridgeSpec {
    fn identity(&self) -> String {
        self.name.clone()
    }
}

/// Desired configuration of a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    /// Port name (identity, together with the bridge)
    pub name: String,
    /// Parent bridge name
    pub bridge_name: String,
    /// Operational action
    pub action: PortAction,
    /// Protocols used when talking OpenFlow to the parent bridge
    pub protocol_versions: ProtocolVersions,
}

impl PortSpec {
    /// Create a validated port spec
    pub fn new(
        name: impl Into<String>,
        bridge_name: impl Into<String>,
        action: PortAction,
        protocol_versions: ProtocolVersions,
    ) -> CfgMgrResult<Self> {
        let name = name.into();
        let bridge_name = bridge_name.into();
        validate_name("name", &name)?;
        validate_name("bridge_id", &bridge_name)?;
        let protocol_versions = if protocol_versions.is_empty() {
            ProtocolVersions::from([ProtocolVersion::default()])
        } else {
            protocol_versions
        };
        Ok(Self {
            name,
            bridge_name,
            action,
            protocol_versions,
        })
    }
}

impl ResourceSpec for PortSpec {
    fn identity(&self) -> String {
        id::encode(&self.bridge_name, &self.name)
    }
}
