//! Persisted tracked state
//!
//! One [`TrackedResource`] per managed bridge and port, stored as pretty JSON:
//!
//! ```json
//! { "bridges": { "br0": { "id": "br0", "last_known_config": { ... } } },
//!   "ports":   { "br0:eth0": { "id": "br0:eth0", "last_known_config": { ... } } } }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use ovs_cfgmgr_common::{CfgMgrError, CfgMgrResult, ResourceSpec, TrackedResource};

use crate::types::{BridgeSpec, PortSpec};

/// Default state file path
pub const DEFAULT_STATE_PATH: &str = "/var/lib/switchmgrd/state.json";

/// Every resource currently under management, keyed by identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedState {
    /// Bridges keyed by name
    #[serde(default)]
    pub bridges: BTreeMap<String, TrackedResource<BridgeSpec>>,
    /// Ports keyed by `bridge:port`
    #[serde(default)]
    pub ports: BTreeMap<String, TrackedResource<PortSpec>>,
}

impl TrackedState {
    /// Returns true if nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty() && self.ports.is_empty()
    }

    /// Records a bridge; records without identity are dropped instead.
    pub fn put_bridge(&mut self, tracked: TrackedResource<BridgeSpec>) {
        let key = tracked.last_known_config.identity();
        if tracked.is_present() {
            self.bridges.insert(key, tracked);
        } else {
            self.bridges.remove(&key);
        }
    }

    /// Records a port; records without identity are dropped instead.
    pub fn put_port(&mut self, tracked: TrackedResource<PortSpec>) {
        let key = tracked.last_known_config.identity();
        if tracked.is_present() {
            self.ports.insert(key, tracked);
        } else {
            self.ports.remove(&key);
        }
    }

    /// Looks up the tracked port with the given port name on any bridge
    pub fn port_named(&self, name: &str) -> Option<&TrackedResource<PortSpec>> {
        self.ports
            .values()
            .find(|p| p.last_known_config.name == name)
    }
}

/// JSON file holding the [`TrackedState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads state; a missing file is an empty state.
    pub fn load(&self) -> CfgMgrResult<TrackedState> {
        let path_str = self.path.display().to_string();
        if !self.path.exists() {
            debug!("No state file at {}, starting empty", path_str);
            return Ok(TrackedState::default());
        }

        let content =
            fs::read_to_string(&self.path).map_err(|e| CfgMgrError::state(&path_str, e))?;
        let state: TrackedState =
            serde_json::from_str(&content).map_err(|e| CfgMgrError::state(&path_str, e))?;
        info!(
            "Loaded state with {} bridges and {} ports from {}",
            state.bridges.len(),
            state.ports.len(),
            path_str
        );
        Ok(state)
    }

    /// Writes state through a sibling temp file and rename.
    pub fn save(&self, state: &TrackedState) -> CfgMgrResult<()> {
        let path_str = self.path.display().to_string();
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| CfgMgrError::state(&path_str, e))?;
            }
        }

        let json =
            serde_json::to_string_pretty(state).map_err(|e| CfgMgrError::state(&path_str, e))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json).map_err(|e| CfgMgrError::state(&path_str, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| CfgMgrError::state(&path_str, e))?;

        debug!("Saved state to {}", path_str);
        Ok(())
    }
}
