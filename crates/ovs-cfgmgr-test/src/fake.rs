//! In-memory switch for driving reconcilers without Open vSwitch
//!
//! Behaves like `ovs-vsctl` with `--may-exist` / `--if-exists`: adding an
//! existing bridge or port and deleting a missing one succeed. Querying or
//! attaching to a missing bridge fails, as does creating an existing tap.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use ovs_cfgmgr_common::{CfgMgrError, CfgMgrResult};
use ovs_switchmgrd::{InterfaceAdapter, PortAction, ProtocolVersion, SwitchAdapter};

/// Adapter operation kinds, used for failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    AddBridge,
    SetBridgeProtocols,
    DeleteBridge,
    BridgeExists,
    AddPort,
    DeletePort,
    ListPorts,
    SetPortAction,
    CreateTap,
    DeleteTap,
}

/// One recorded adapter call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    AddBridge(String),
    SetBridgeProtocols(String, Vec<ProtocolVersion>),
    DeleteBridge(String),
    BridgeExists(String),
    AddPort(String, String),
    DeletePort(String, String),
    ListPorts(String),
    SetPortAction(String, String, PortAction),
    CreateTap(String, String),
    DeleteTap(String),
}

impl Call {
    /// Returns the operation kind of this call
    pub fn op(&self) -> Op {
        match self {
            Call::AddBridge(_) => Op::AddBridge,
            Call::SetBridgeProtocols(..) => Op::SetBridgeProtocols,
            Call::DeleteBridge(_) => Op::DeleteBridge,
            Call::BridgeExists(_) => Op::BridgeExists,
            Call::AddPort(..) => Op::AddPort,
            Call::DeletePort(..) => Op::DeletePort,
            Call::ListPorts(_) => Op::ListPorts,
            Call::SetPortAction(..) => Op::SetPortAction,
            Call::CreateTap(..) => Op::CreateTap,
            Call::DeleteTap(_) => Op::DeleteTap,
        }
    }

    /// Returns true for calls that change switch or host state
    pub fn is_mutation(&self) -> bool {
        !matches!(self.op(), Op::BridgeExists | Op::ListPorts)
    }
}

#[derive(Debug, Default)]
struct FakeBridge {
    protocols: Vec<ProtocolVersion>,
    ports: BTreeMap<String, PortAction>,
}

#[derive(Debug, Default)]
struct Inner {
    bridges: BTreeMap<String, FakeBridge>,
    taps: BTreeMap<String, String>,
    calls: Vec<Call>,
    failures: HashSet<Op>,
}

/// In-memory switch and host
#[derive(Debug, Default)]
pub struct FakeSwitch {
    inner: Mutex<Inner>,
}

fn failure(op: Op, output: impl Into<String>) -> CfgMgrError {
    CfgMgrError::ShellCommandFailed {
        command: format!("{:?}", op),
        exit_code: 1,
        output: output.into(),
    }
}

impl FakeSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test poisons the lock; later assertions still need it.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records `call` and fails it if its operation was injected
    fn record(&self, call: Call) -> CfgMgrResult<MutexGuard<'_, Inner>> {
        let mut inner = self.lock();
        debug!("Fake switch call: {:?}", call);
        let op = call.op();
        inner.calls.push(call);
        if inner.failures.contains(&op) {
            return Err(failure(op, "injected failure"));
        }
        Ok(inner)
    }

    /// Makes every subsequent call of `op` fail
    pub fn fail(&self, op: Op) {
        self.lock().failures.insert(op);
    }

    /// Stops failing `op`
    pub fn heal(&self, op: Op) {
        self.lock().failures.remove(&op);
    }

    /// Returns the calls made so far
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Forgets recorded calls
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Adds a bridge as if created by someone else
    pub fn seed_bridge(&self, name: &str) {
        self.lock().bridges.entry(name.to_string()).or_default();
    }

    /// Removes a bridge behind the reconciler's back
    pub fn remove_bridge_externally(&self, name: &str) {
        self.lock().bridges.remove(name);
    }

    /// Removes a port behind the reconciler's back
    pub fn remove_port_externally(&self, bridge: &str, port: &str) {
        if let Some(b) = self.lock().bridges.get_mut(bridge) {
            b.ports.remove(port);
        }
    }

    /// Creates a tap as if left over from an earlier run
    pub fn seed_tap(&self, name: &str, owner: &str) {
        self.lock()
            .taps
            .insert(name.to_string(), owner.to_string());
    }

    pub fn has_bridge(&self, name: &str) -> bool {
        self.lock().bridges.contains_key(name)
    }

    pub fn bridge_protocols(&self, name: &str) -> Option<Vec<ProtocolVersion>> {
        self.lock().bridges.get(name).map(|b| b.protocols.clone())
    }

    pub fn port_action(&self, bridge: &str, port: &str) -> Option<PortAction> {
        self.lock()
            .bridges
            .get(bridge)
            .and_then(|b| b.ports.get(port).copied())
    }

    pub fn has_port(&self, bridge: &str, port: &str) -> bool {
        self.port_action(bridge, port).is_some()
    }

    pub fn tap_owner(&self, name: &str) -> Option<String> {
        self.lock().taps.get(name).cloned()
    }

    pub fn bridge_count(&self) -> usize {
        self.lock().bridges.len()
    }
}

#[async_trait]
impl SwitchAdapter for FakeSwitch {
    async fn add_bridge(&self, bridge: &str) -> CfgMgrResult<()> {
        let mut inner = self.record(Call::AddBridge(bridge.to_string()))?;
        inner.bridges.entry(bridge.to_string()).or_default();
        Ok(())
    }

    async fn set_bridge_protocols(
        &self,
        bridge: &str,
        protocols: &[ProtocolVersion],
    ) -> CfgMgrResult<()> {
        let mut inner = self.record(Call::SetBridgeProtocols(
            bridge.to_string(),
            protocols.to_vec(),
        ))?;
        match inner.bridges.get_mut(bridge) {
            Some(b) => {
                b.protocols = protocols.to_vec();
                Ok(())
            }
            None => Err(failure(
                Op::SetBridgeProtocols,
                format!("no row \"{}\" in table Bridge", bridge),
            )),
        }
    }

    async fn delete_bridge(&self, bridge: &str) -> CfgMgrResult<()> {
        let mut inner = self.record(Call::DeleteBridge(bridge.to_string()))?;
        inner.bridges.remove(bridge);
        Ok(())
    }

    async fn bridge_exists(&self, bridge: &str) -> CfgMgrResult<bool> {
        let inner = self.record(Call::BridgeExists(bridge.to_string()))?;
        Ok(inner.bridges.contains_key(bridge))
    }

    async fn add_port(&self, bridge: &str, port: &str) -> CfgMgrResult<()> {
        let mut inner = self.record(Call::AddPort(bridge.to_string(), port.to_string()))?;
        let elsewhere = inner
            .bridges
            .iter()
            .any(|(name, b)| name != bridge && b.ports.contains_key(port));
        if elsewhere {
            return Err(failure(
                Op::AddPort,
                format!("cannot create a port named {} because it already exists", port),
            ));
        }
        match inner.bridges.get_mut(bridge) {
            Some(b) => {
                b.ports.entry(port.to_string()).or_default();
                Ok(())
            }
            None => Err(failure(Op::AddPort, format!("no bridge named {}", bridge))),
        }
    }

    async fn delete_port(&self, bridge: &str, port: &str) -> CfgMgrResult<()> {
        let mut inner = self.record(Call::DeletePort(bridge.to_string(), port.to_string()))?;
        if let Some(b) = inner.bridges.get_mut(bridge) {
            b.ports.remove(port);
        }
        Ok(())
    }

    async fn list_ports(&self, bridge: &str) -> CfgMgrResult<Vec<String>> {
        let inner = self.record(Call::ListPorts(bridge.to_string()))?;
        match inner.bridges.get(bridge) {
            Some(b) => Ok(b.ports.keys().cloned().collect()),
            None => Err(failure(Op::ListPorts, format!("no bridge named {}", bridge))),
        }
    }

    async fn set_port_action(
        &self,
        bridge: &str,
        port: &str,
        action: PortAction,
    ) -> CfgMgrResult<()> {
        let mut inner = self.record(Call::SetPortAction(
            bridge.to_string(),
            port.to_string(),
            action,
        ))?;
        match inner
            .bridges
            .get_mut(bridge)
            .and_then(|b| b.ports.get_mut(port))
        {
            Some(current) => {
                *current = action;
                Ok(())
            }
            None => Err(failure(
                Op::SetPortAction,
                format!("{}: couldn't find port `{}'", bridge, port),
            )),
        }
    }
}

#[async_trait]
impl InterfaceAdapter for FakeSwitch {
    async fn create_virtual_interface(&self, name: &str, owner: &str) -> CfgMgrResult<()> {
        let mut inner = self.record(Call::CreateTap(name.to_string(), owner.to_string()))?;
        if inner.taps.contains_key(name) {
            return Err(failure(Op::CreateTap, "ioctl(TUNSETIFF): Device or resource busy"));
        }
        inner.taps.insert(name.to_string(), owner.to_string());
        Ok(())
    }

    async fn delete_virtual_interface(&self, name: &str) -> CfgMgrResult<()> {
        let mut inner = self.record(Call::DeleteTap(name.to_string()))?;
        match inner.taps.remove(name) {
            Some(_) => Ok(()),
            None => Err(failure(
                Op::DeleteTap,
                format!("Cannot find device \"{}\"", name),
            )),
        }
    }
}
