//! Desired-state configuration file
//!
//! Loads the bridges and ports to manage from a TOML file and validates them
//! into strongly typed specs. Default location: /etc/switchmgrd/switchmgrd.toml
//!
//! ```toml
//! [client]
//! sudo = true
//!
//! [[bridge]]
//! name = "br0"
//! protocol_version = "OpenFlow13"
//!
//! [[port]]
//! name = "eth0"
//! bridge_id = "br0"
//! action = "up"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use ovs_cfgmgr_common::{defaults, CfgMgrError, CfgMgrResult};

use crate::client::ClientOptions;
use crate::types::{
    parse_protocol_versions, port_action, BridgeSpec, PortAction, PortSpec, ProtocolVersion,
};

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/switchmgrd/switchmgrd.toml";

/// Switch client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Run switch and tap commands through sudo
    #[serde(default = "default_sudo")]
    pub sudo: bool,

    /// OpenFlow versions `ovs-ofctl` may negotiate
    #[serde(default = "default_client_protocols")]
    pub protocols: Vec<String>,

    /// Owner of created tap devices (defaults to the invoking user)
    #[serde(default)]
    pub tap_owner: Option<String>,
}

/// One `[[bridge]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Bridge name
    pub name: String,

    /// Single protocol version
    #[serde(default)]
    pub protocol_version: Option<String>,

    /// Several protocol versions
    #[serde(default)]
    pub protocol_versions: Vec<String>,
}

/// One `[[port]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfig {
    /// Port (and tap device) name
    pub name: String,

    /// Name of the bridge the port attaches to
    pub bridge_id: String,

    /// Port action keyword, e.g. "up" or "no-flood"
    #[serde(default = "default_action")]
    pub action: String,

    /// Single protocol version
    #[serde(default)]
    pub protocol_version: Option<String>,

    /// Several protocol versions
    #[serde(default)]
    pub protocol_versions: Vec<String>,
}

/// Complete switchmgrd configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchConfig {
    /// Client configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Bridges to manage
    #[serde(default, rename = "bridge")]
    pub bridges: Vec<BridgeConfig>,

    /// Ports to manage
    #[serde(default, rename = "port")]
    pub ports: Vec<PortConfig>,
}

/// Validated desired state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredState {
    /// Bridges, in file order
    pub bridges: Vec<BridgeSpec>,
    /// Ports, in file order
    pub ports: Vec<PortSpec>,
}

fn default_sudo() -> bool {
    true
}

fn default_client_protocols() -> Vec<String> {
    ProtocolVersion::ALL
        .iter()
        .map(|v| v.as_str().to_string())
        .collect()
}

fn default_action() -> String {
    defaults::DEFAULT_PORT_ACTION.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            sudo: default_sudo(),
            protocols: default_client_protocols(),
            tap_owner: None,
        }
    }
}

impl ClientConfig {
    /// Converts to validated client options
    pub fn to_options(&self) -> CfgMgrResult<ClientOptions> {
        Ok(ClientOptions {
            sudo: self.sudo,
            protocols: parse_protocol_versions(&self.protocols)?,
        })
    }
}

fn versions_of(single: &Option<String>, many: &[String]) -> Vec<String> {
    single.iter().chain(many.iter()).cloned().collect()
}

impl BridgeConfig {
    /// Validates into a [`BridgeSpec`]
    pub fn to_spec(&self) -> CfgMgrResult<BridgeSpec> {
        let versions =
            parse_protocol_versions(versions_of(&self.protocol_version, &self.protocol_versions))?;
        BridgeSpec::new(self.name.clone(), versions)
    }
}

impl PortConfig {
    /// Validates into a [`PortSpec`]
    ///
    /// The action must be one of the exact keywords in [`PortAction::ALL`].
    pub fn to_spec(&self) -> CfgMgrResult<PortSpec> {
        if !PortAction::ALL.iter().any(|a| a.as_str() == self.action) {
            return Err(CfgMgrError::invalid_config(
                "action",
                format!("unknown port action '{}' on port {}", self.action, self.name),
            ));
        }
        let versions =
            parse_protocol_versions(versions_of(&self.protocol_version, &self.protocol_versions))?;
        PortSpec::new(
            self.name.clone(),
            self.bridge_id.clone(),
            port_action(&self.action),
            versions,
        )
    }
}

impl SwitchConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> CfgMgrResult<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|e| CfgMgrError::config(&path_str, e))?;
        let config = Self::from_toml(&content).map_err(|e| CfgMgrError::config(&path_str, e))?;
        info!(
            "Loaded {} bridges and {} ports from {}",
            config.bridges.len(),
            config.ports.len(),
            path_str
        );
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Validates every entry into the desired state
    pub fn desired_state(&self) -> CfgMgrResult<DesiredState> {
        let mut bridge_names = HashSet::new();
        let mut bridges = Vec::with_capacity(self.bridges.len());
        for entry in &self.bridges {
            let spec = entry.to_spec()?;
            if !bridge_names.insert(spec.name.clone()) {
                return Err(CfgMgrError::invalid_config(
                    "bridge",
                    format!("bridge '{}' declared twice", spec.name),
                ));
            }
            bridges.push(spec);
        }

        // Tap devices are host-wide, so a port name may appear only once.
        let mut port_names = HashSet::new();
        let mut ports = Vec::with_capacity(self.ports.len());
        for entry in &self.ports {
            let spec = entry.to_spec()?;
            if !port_names.insert(spec.name.clone()) {
                return Err(CfgMgrError::invalid_config(
                    "port",
                    format!("port '{}' declared twice", spec.name),
                ));
            }
            if !bridges.iter().any(|b| b.name == spec.bridge_name) {
                debug!(
                    "Port {} attaches to bridge {} which is not managed here",
                    spec.name, spec.bridge_name
                );
            }
            ports.push(spec);
        }

        Ok(DesiredState { bridges, ports })
    }
}
