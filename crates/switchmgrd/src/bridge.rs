//! BridgeReconciler - converges bridges with the switch

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use ovs_cfgmgr_common::{
    Absence, CfgMgrError, CfgMgrResult, Observed, Reconciler, ResourceState, TrackedResource,
};

use crate::adapter::SwitchAdapter;
use crate::types::{BridgeSpec, ProtocolVersion};

/// Reconciles bridge resources.
///
/// Lifecycle: `Unmanaged -> Creating -> Present -> Deleting -> Unmanaged`.
/// Bridges are tracked by name.
pub struct BridgeReconciler {
    switch: Arc<dyn SwitchAdapter>,
}

impl BridgeReconciler {
    /// Creates a reconciler using the shared switch adapter
    pub fn new(switch: Arc<dyn SwitchAdapter>) -> Self {
        Self { switch }
    }
}

#[async_trait]
impl Reconciler for BridgeReconciler {
    type Spec = BridgeSpec;

    fn kind(&self) -> &'static str {
        "bridge"
    }

    /// Adds the bridge, then restricts its protocols.
    ///
    /// A protocol failure is surfaced with the bridge already on the switch;
    /// nothing is rolled back and the next read picks it up.
    #[instrument(skip(self, spec), fields(bridge = %spec.name, state = ResourceState::Creating.as_str()))]
    async fn create(&self, spec: &BridgeSpec) -> CfgMgrResult<TrackedResource<BridgeSpec>> {
        self.switch
            .add_bridge(&spec.name)
            .await
            .map_err(|e| CfgMgrError::operation("add-bridge", &spec.name, e))?;

        let protocols: Vec<ProtocolVersion> = spec.protocol_versions.iter().copied().collect();
        if let Err(e) = self
            .switch
            .set_bridge_protocols(&spec.name, &protocols)
            .await
        {
            warn!(
                "Bridge {} created but protocols {:?} not applied: {}",
                spec.name, protocols, e
            );
            return Err(CfgMgrError::operation("set-bridge-protocols", &spec.name, e));
        }

        info!("Created bridge {}", spec.name);
        let mut tracked = TrackedResource::present(spec.name.clone(), spec.clone());
        self.read(&mut tracked).await?;
        Ok(tracked)
    }

    /// Checks the bridge still exists.
    ///
    /// Protocol versions cannot be queried back, so the tracked value is kept
    /// as-is.
    #[instrument(skip(self, tracked), fields(id = %tracked.id))]
    async fn read(&self, tracked: &mut TrackedResource<BridgeSpec>) -> CfgMgrResult<Observed> {
        let name = if tracked.is_present() {
            tracked.id.clone()
        } else {
            tracked.last_known_config.name.clone()
        };

        let exists = self
            .switch
            .bridge_exists(&name)
            .await
            .map_err(|e| CfgMgrError::operation("bridge-exists", &name, e))?;

        if !exists {
            if tracked.is_present() {
                info!("Bridge {} no longer exists, dropping tracked state", name);
            }
            tracked.clear();
            return Ok(Observed::Absent(Absence::NotFound));
        }

        tracked.last_known_config.name = name.clone();
        tracked.id = name;
        debug!("Bridge {} present", tracked.id);
        Ok(Observed::Present)
    }

    /// Nothing on a bridge is mutable in place; records the new intent and
    /// reads back.
    #[instrument(skip(self, tracked, spec), fields(id = %tracked.id))]
    async fn update(
        &self,
        tracked: &mut TrackedResource<BridgeSpec>,
        spec: &BridgeSpec,
    ) -> CfgMgrResult<()> {
        if tracked.is_present() && tracked.id != spec.name {
            return Err(CfgMgrError::invalid_config(
                "name",
                format!(
                    "bridge '{}' cannot be renamed to '{}' in place",
                    tracked.id, spec.name
                ),
            ));
        }
        tracked.last_known_config = spec.clone();
        self.read(tracked).await?;
        Ok(())
    }

    #[instrument(skip(self, tracked), fields(id = %tracked.id, state = ResourceState::Deleting.as_str()))]
    async fn delete(&self, tracked: &mut TrackedResource<BridgeSpec>) -> CfgMgrResult<()> {
        let name = tracked.last_known_config.name.clone();
        self.switch
            .delete_bridge(&name)
            .await
            .map_err(|e| CfgMgrError::operation("delete-bridge", &name, e))?;

        tracked.clear();
        info!("Deleted bridge {}", name);
        Ok(())
    }
}
