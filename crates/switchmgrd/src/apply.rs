//! Orchestrator - plans and applies desired state against tracked state
//!
//! Execution order within a plan:
//! 1. port deletes (including the old side of a replace)
//! 2. bridge deletes
//! 3. bridge creates and updates
//! 4. port creates and updates (including the new side of a replace)
//!
//! Tracked state is checkpointed to the store after every step, so a failure
//! part way leaves an accurate record of what was done.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use ovs_cfgmgr_common::{CfgMgrResult, Observed, Reconciler, ResourceSpec, TrackedResource};

use crate::adapter::{InterfaceAdapter, SwitchAdapter};
use crate::bridge::BridgeReconciler;
use crate::config::DesiredState;
use crate::port::PortReconciler;
use crate::state::{StateStore, TrackedState};
use crate::types::{BridgeSpec, PortSpec};

/// One planned change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    CreateBridge(BridgeSpec),
    UpdateBridge(BridgeSpec),
    /// Tracked bridge name
    DeleteBridge(String),
    CreatePort(PortSpec),
    UpdatePort(PortSpec),
    /// A port whose identity changed: the tracked `old` id is deleted and
    /// `new` created in its place.
    ReplacePort { old: String, new: PortSpec },
    /// Tracked port id
    DeletePort(String),
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::CreateBridge(spec) => write!(f, "+ bridge {}", spec.name),
            Step::UpdateBridge(spec) => write!(f, "~ bridge {}", spec.name),
            Step::DeleteBridge(name) => write!(f, "- bridge {}", name),
            Step::CreatePort(spec) => {
                write!(f, "+ port {} ({})", spec.identity(), spec.action)
            }
            Step::UpdatePort(spec) => {
                write!(f, "~ port {} ({})", spec.identity(), spec.action)
            }
            Step::ReplacePort { old, new } => {
                write!(f, "-/+ port {} -> {}", old, new.identity())
            }
            Step::DeletePort(id) => write!(f, "- port {}", id),
        }
    }
}

/// Ordered list of changes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return writeln!(f, "No changes.");
        }
        for step in &self.steps {
            writeln!(f, "{}", step)?;
        }
        writeln!(f, "{} change(s).", self.steps.len())
    }
}

/// Computes the changes needed to move `state` to `desired`.
///
/// Ports are matched by name, since the tap device shadowing a port is
/// host-wide; a matched port whose bridge changed is replaced. Tracked ports
/// on a bridge being deleted are always deleted first and never matched, so a
/// port still declared there is planned as a fresh create.
pub fn plan(state: &TrackedState, desired: &DesiredState) -> Plan {
    let mut port_deletes = Vec::new();
    let mut port_replaces = Vec::new();
    let mut bridge_deletes = Vec::new();
    let mut bridge_changes = Vec::new();
    let mut port_changes = Vec::new();

    let bridge_removed = |bridge: &str| {
        state.bridges.contains_key(bridge) && !desired.bridges.iter().any(|b| b.name == bridge)
    };
    let on_removed_bridge = |tracked: &&TrackedResource<PortSpec>| {
        bridge_removed(tracked.last_known_config.bridge_name.as_str())
    };

    for (key, tracked) in &state.ports {
        let name = &tracked.last_known_config.name;
        if on_removed_bridge(&tracked) || !desired.ports.iter().any(|p| &p.name == name) {
            port_deletes.push(Step::DeletePort(key.clone()));
        }
    }

    for key in state.bridges.keys() {
        if !desired.bridges.iter().any(|b| &b.name == key) {
            bridge_deletes.push(Step::DeleteBridge(key.clone()));
        }
    }

    for spec in &desired.bridges {
        match state.bridges.get(&spec.name) {
            None => bridge_changes.push(Step::CreateBridge(spec.clone())),
            Some(tracked) if tracked.last_known_config != *spec => {
                bridge_changes.push(Step::UpdateBridge(spec.clone()))
            }
            Some(_) => {}
        }
    }

    for spec in &desired.ports {
        match state
            .port_named(&spec.name)
            .filter(|t| !on_removed_bridge(t))
        {
            None => port_changes.push(Step::CreatePort(spec.clone())),
            Some(tracked) if !tracked.last_known_config.same_identity(spec) => {
                port_replaces.push(Step::ReplacePort {
                    old: tracked.last_known_config.identity(),
                    new: spec.clone(),
                })
            }
            Some(tracked) if tracked.last_known_config != *spec => {
                port_changes.push(Step::UpdatePort(spec.clone()))
            }
            Some(_) => {}
        }
    }

    let mut steps = port_deletes;
    steps.append(&mut port_replaces);
    steps.append(&mut bridge_deletes);
    steps.append(&mut bridge_changes);
    steps.append(&mut port_changes);
    Plan { steps }
}

/// Resources dropped from tracked state by a refresh
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Number of records read
    pub checked: usize,
    /// Identifiers that were gone from the switch
    pub dropped: Vec<String>,
}

/// Drives the bridge and port reconcilers over a whole configuration.
pub struct Orchestrator {
    bridges: BridgeReconciler,
    ports: PortReconciler,
    store: Option<StateStore>,
}

impl Orchestrator {
    /// Creates an orchestrator sharing one adapter pair between both reconcilers
    pub fn new(
        switch: Arc<dyn SwitchAdapter>,
        interfaces: Arc<dyn InterfaceAdapter>,
        tap_owner: impl Into<String>,
    ) -> Self {
        Self {
            bridges: BridgeReconciler::new(switch.clone()),
            ports: PortReconciler::new(switch, interfaces, tap_owner),
            store: None,
        }
    }

    /// Checkpoints tracked state to `store` after every step
    pub fn with_store(mut self, store: StateStore) -> Self {
        self.store = Some(store);
        self
    }

    fn checkpoint(&self, state: &TrackedState) -> CfgMgrResult<()> {
        match &self.store {
            Some(store) => store.save(state),
            None => Ok(()),
        }
    }

    /// Reads every tracked resource back and drops the ones that are gone.
    ///
    /// Bridges are read first, so ports of a vanished bridge are dropped too.
    #[instrument(skip(self, state))]
    pub async fn refresh(&self, state: &mut TrackedState) -> CfgMgrResult<RefreshReport> {
        let mut report = RefreshReport::default();

        let keys: Vec<String> = state.bridges.keys().cloned().collect();
        for key in keys {
            let Some(mut tracked) = state.bridges.remove(&key) else {
                continue;
            };
            report.checked += 1;
            match self.bridges.read(&mut tracked).await {
                Ok(Observed::Present) => {
                    state.bridges.insert(key, tracked);
                }
                Ok(Observed::Absent(reason)) => {
                    warn!(
                        "{} {} drifted ({:?}), will be recreated",
                        self.bridges.kind(),
                        key,
                        reason
                    );
                    report.dropped.push(key);
                }
                Err(e) => {
                    state.bridges.insert(key, tracked);
                    return Err(e);
                }
            }
        }

        let keys: Vec<String> = state.ports.keys().cloned().collect();
        for key in keys {
            let Some(mut tracked) = state.ports.remove(&key) else {
                continue;
            };
            report.checked += 1;
            match self.ports.read(&mut tracked).await {
                Ok(Observed::Present) => {
                    state.ports.insert(key, tracked);
                }
                Ok(Observed::Absent(reason)) => {
                    warn!(
                        "{} {} drifted ({:?}), will be recreated",
                        self.ports.kind(),
                        key,
                        reason
                    );
                    report.dropped.push(key);
                }
                Err(e) => {
                    state.ports.insert(key, tracked);
                    return Err(e);
                }
            }
        }

        self.checkpoint(state)?;
        info!(
            "Refreshed {} resources, {} gone",
            report.checked,
            report.dropped.len()
        );
        Ok(report)
    }

    /// Executes `plan` against the switch, updating `state` as steps succeed.
    ///
    /// Stops at the first fatal error. Returns the number of steps applied.
    #[instrument(skip(self, state, plan), fields(steps = plan.len()))]
    pub async fn apply(&self, state: &mut TrackedState, plan: &Plan) -> CfgMgrResult<usize> {
        let mut applied = 0;

        // Deletes first: plain port deletes and the old side of replaces
        for step in &plan.steps {
            match step {
                Step::DeletePort(id) | Step::ReplacePort { old: id, .. } => {
                    self.run(step, self.delete_port(state, id).await)?;
                    if matches!(step, Step::DeletePort(_)) {
                        applied += 1;
                    }
                }
                _ => {}
            }
        }

        for step in &plan.steps {
            if let Step::DeleteBridge(name) = step {
                self.run(step, self.delete_bridge(state, name).await)?;
                applied += 1;
            }
        }

        for step in &plan.steps {
            match step {
                Step::CreateBridge(spec) => {
                    self.run(step, self.create_bridge(state, spec).await)?;
                    applied += 1;
                }
                Step::UpdateBridge(spec) => {
                    self.run(step, self.update_bridge(state, spec).await)?;
                    applied += 1;
                }
                _ => {}
            }
        }

        for step in &plan.steps {
            match step {
                Step::CreatePort(spec) | Step::ReplacePort { new: spec, .. } => {
                    self.run(step, self.create_port(state, spec).await)?;
                    applied += 1;
                }
                Step::UpdatePort(spec) => {
                    self.run(step, self.update_port(state, spec).await)?;
                    applied += 1;
                }
                _ => {}
            }
        }

        self.checkpoint(state)?;
        info!("Applied {} change(s)", applied);
        Ok(applied)
    }

    /// Refreshes, plans and applies in one go.
    pub async fn converge(
        &self,
        state: &mut TrackedState,
        desired: &DesiredState,
    ) -> CfgMgrResult<Plan> {
        self.refresh(state).await?;
        let plan = plan(state, desired);
        self.apply(state, &plan).await?;
        Ok(plan)
    }

    /// Deletes every tracked resource, ports before bridges.
    pub async fn destroy(&self, state: &mut TrackedState) -> CfgMgrResult<usize> {
        let plan = plan(state, &DesiredState::default());
        self.apply(state, &plan).await
    }

    /// Logs the outcome of a step.
    fn run(&self, step: &Step, result: CfgMgrResult<()>) -> CfgMgrResult<()> {
        match result {
            Ok(()) => {
                info!("{}", step);
                Ok(())
            }
            Err(e) => {
                error!("{} failed: {}", step, e);
                Err(e)
            }
        }
    }

    async fn create_bridge(&self, state: &mut TrackedState, spec: &BridgeSpec) -> CfgMgrResult<()> {
        let tracked = self.bridges.create(spec).await?;
        state.put_bridge(tracked);
        self.checkpoint(state)
    }

    async fn create_port(&self, state: &mut TrackedState, spec: &PortSpec) -> CfgMgrResult<()> {
        let tracked = self.ports.create(spec).await?;
        state.put_port(tracked);
        self.checkpoint(state)
    }

    async fn delete_port(&self, state: &mut TrackedState, id: &str) -> CfgMgrResult<()> {
        let Some(mut tracked) = state.ports.get(id).cloned() else {
            return Ok(());
        };
        self.ports.delete(&mut tracked).await?;
        state.ports.remove(id);
        self.checkpoint(state)
    }

    async fn delete_bridge(&self, state: &mut TrackedState, name: &str) -> CfgMgrResult<()> {
        let Some(mut tracked) = state.bridges.get(name).cloned() else {
            return Ok(());
        };
        self.bridges.delete(&mut tracked).await?;
        state.bridges.remove(name);
        self.checkpoint(state)
    }

    async fn update_bridge(&self, state: &mut TrackedState, spec: &BridgeSpec) -> CfgMgrResult<()> {
        let mut tracked = state
            .bridges
            .get(&spec.name)
            .cloned()
            .unwrap_or_else(|| TrackedResource::present(spec.name.clone(), spec.clone()));
        self.bridges.update(&mut tracked, spec).await?;
        state.put_bridge(tracked);
        self.checkpoint(state)
    }

    async fn update_port(&self, state: &mut TrackedState, spec: &PortSpec) -> CfgMgrResult<()> {
        let id = spec.identity();
        let mut tracked = state
            .ports
            .get(&id)
            .cloned()
            .unwrap_or_else(|| TrackedResource::present(id.clone(), spec.clone()));
        self.ports.update(&mut tracked, spec).await?;
        state.put_port(tracked);
        self.checkpoint(state)
    }
}
