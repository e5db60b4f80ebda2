//! PortReconciler - converges switch ports and their tap devices
//!
//! A port has two halves: the tap device on the host and the port record on
//! the bridge. The bridge attach is authoritative; tap handling and the
//! initial action are best effort.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use ovs_cfgmgr_common::{
    Absence, CfgMgrError, CfgMgrResult, Observed, Reconciler, ResourceSpec, ResourceState,
    TrackedResource,
};

use crate::adapter::{InterfaceAdapter, SwitchAdapter};
use crate::id;
use crate::types::{PortAction, PortSpec};

/// Reconciles port resources, tracked as `bridge:port`.
pub struct PortReconciler {
    switch: Arc<dyn SwitchAdapter>,
    interfaces: Arc<dyn InterfaceAdapter>,
    /// User that owns created tap devices
    tap_owner: String,
}

impl PortReconciler {
    /// Creates a reconciler using the shared adapters
    pub fn new(
        switch: Arc<dyn SwitchAdapter>,
        interfaces: Arc<dyn InterfaceAdapter>,
        tap_owner: impl Into<String>,
    ) -> Self {
        Self {
            switch,
            interfaces,
            tap_owner: tap_owner.into(),
        }
    }

    /// Resolves `(bridge, port)` from the tracked id, or from the desired
    /// config when nothing has been created yet.
    fn locate(tracked: &TrackedResource<PortSpec>) -> CfgMgrResult<(String, String)> {
        if tracked.is_present() {
            id::decode(&tracked.id)
        } else {
            let config = &tracked.last_known_config;
            Ok((config.bridge_name.clone(), config.name.clone()))
        }
    }
}

#[async_trait]
impl Reconciler for PortReconciler {
    type Spec = PortSpec;

    fn kind(&self) -> &'static str {
        "port"
    }

    #[instrument(skip(self, spec), fields(bridge = %spec.bridge_name, port = %spec.name, state = ResourceState::Creating.as_str()))]
    async fn create(&self, spec: &PortSpec) -> CfgMgrResult<TrackedResource<PortSpec>> {
        // The tap may survive from an earlier partial run.
        if let Err(e) = self
            .interfaces
            .create_virtual_interface(&spec.name, &self.tap_owner)
            .await
        {
            warn!(
                "Could not create tap device {} (may already exist): {}",
                spec.name, e
            );
        }

        self.switch
            .add_port(&spec.bridge_name, &spec.name)
            .await
            .map_err(|e| CfgMgrError::operation("add-port", spec.identity(), e))?;

        // A freshly attached port is up; record that when the action did not
        // land so the next plan carries an update for it.
        let mut applied = spec.clone();
        if let Err(e) = self
            .switch
            .set_port_action(&spec.bridge_name, &spec.name, spec.action)
            .await
        {
            warn!(
                "Port {} attached to {} but action '{}' not applied: {}",
                spec.name, spec.bridge_name, spec.action, e
            );
            applied.action = PortAction::Up;
        }

        info!("Added port {} to bridge {}", spec.name, spec.bridge_name);
        let mut tracked = TrackedResource::present(spec.identity(), applied);
        self.read(&mut tracked).await?;
        Ok(tracked)
    }

    /// Checks the port is still attached to its bridge.
    ///
    /// Action and protocol versions are not queried back; tracked values are
    /// kept. A bridge whose ports cannot be listed is treated as gone, and so
    /// is the port.
    #[instrument(skip(self, tracked), fields(id = %tracked.id))]
    async fn read(&self, tracked: &mut TrackedResource<PortSpec>) -> CfgMgrResult<Observed> {
        let (bridge, port) = Self::locate(tracked)?;

        let ports = match self.switch.list_ports(&bridge).await {
            Ok(ports) => ports,
            Err(e) => {
                warn!(
                    "Cannot list ports of bridge {} (bridge may not exist), treating port {} as absent: {}",
                    bridge, port, e
                );
                tracked.clear();
                return Ok(Observed::Absent(Absence::ParentUnavailable));
            }
        };

        if !ports.iter().any(|p| p == &port) {
            if tracked.is_present() {
                info!(
                    "Port {} no longer on bridge {}, dropping tracked state",
                    port, bridge
                );
            }
            tracked.clear();
            return Ok(Observed::Absent(Absence::NotFound));
        }

        tracked.id = id::encode(&bridge, &port);
        tracked.last_known_config.name = port;
        tracked.last_known_config.bridge_name = bridge;
        debug!("Port {} present", tracked.id);
        Ok(Observed::Present)
    }

    /// Applies the port action. Failure is fatal here since it is the only
    /// thing an update does.
    #[instrument(skip(self, tracked, spec), fields(id = %tracked.id, action = %spec.action))]
    async fn update(
        &self,
        tracked: &mut TrackedResource<PortSpec>,
        spec: &PortSpec,
    ) -> CfgMgrResult<()> {
        let (bridge, port) = Self::locate(tracked)?;
        if bridge != spec.bridge_name || port != spec.name {
            return Err(CfgMgrError::invalid_config(
                "bridge_id",
                format!(
                    "port '{}' cannot move to '{}' in place",
                    id::encode(&bridge, &port),
                    spec.identity()
                ),
            ));
        }

        self.switch
            .set_port_action(&bridge, &port, spec.action)
            .await
            .map_err(|e| CfgMgrError::operation("set-port-action", spec.identity(), e))?;

        tracked.last_known_config = spec.clone();
        info!("Set port {} action to {}", port, spec.action);
        Ok(())
    }

    #[instrument(skip(self, tracked), fields(id = %tracked.id, state = ResourceState::Deleting.as_str()))]
    async fn delete(&self, tracked: &mut TrackedResource<PortSpec>) -> CfgMgrResult<()> {
        let bridge = tracked.last_known_config.bridge_name.clone();
        let port = tracked.last_known_config.name.clone();

        if let Err(e) = self.interfaces.delete_virtual_interface(&port).await {
            warn!("Could not delete tap device {}: {}", port, e);
        }

        self.switch
            .delete_port(&bridge, &port)
            .await
            .map_err(|e| CfgMgrError::operation("delete-port", id::encode(&bridge, &port), e))?;

        tracked.clear();
        info!("Removed port {} from bridge {}", port, bridge);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{MockInterfaceAdapter, MockSwitchAdapter};
    use crate::types::{PortAction, ProtocolVersion, ProtocolVersions};
    use mockall::Sequence;

    fn spec(action: PortAction) -> PortSpec {
        PortSpec::new(
            "eth0",
            "br0",
            action,
            ProtocolVersions::from([ProtocolVersion::OpenFlow13]),
        )
        .unwrap()
    }

    fn shell_failure() -> CfgMgrError {
        CfgMgrError::ShellCommandFailed {
            command: "ovs-vsctl".to_string(),
            exit_code: 1,
            output: "no bridge named br0".to_string(),
        }
    }

    fn reconciler(switch: MockSwitchAdapter, taps: MockInterfaceAdapter) -> PortReconciler {
        PortReconciler::new(Arc::new(switch), Arc::new(taps), "alice")
    }

    fn lenient_taps() -> MockInterfaceAdapter {
        let mut taps = MockInterfaceAdapter::new();
        taps.expect_create_virtual_interface()
            .returning(|_, _| Ok(()));
        taps.expect_delete_virtual_interface().returning(|_| Ok(()));
        taps
    }

    #[tokio::test]
    async fn test_create_sequence() {
        let mut switch = MockSwitchAdapter::new();
        let mut taps = MockInterfaceAdapter::new();
        let mut seq = Sequence::new();

        taps.expect_create_virtual_interface()
            .withf(|name, owner| name == "eth0" && owner == "alice")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        switch
            .expect_add_port()
            .withf(|b, p| b == "br0" && p == "eth0")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        switch
            .expect_set_port_action()
            .withf(|b, p, a| b == "br0" && p == "eth0" && *a == PortAction::Flood)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        switch
            .expect_list_ports()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec!["eth0".to_string()]));

        let tracked = reconciler(switch, taps)
            .create(&spec(PortAction::Flood))
            .await
            .unwrap();
        assert_eq!(tracked.id, "br0:eth0");
        assert_eq!(tracked.last_known_config.action, PortAction::Flood);
    }

    #[tokio::test]
    async fn test_create_tap_failure_is_advisory() {
        let mut switch = MockSwitchAdapter::new();
        let mut taps = MockInterfaceAdapter::new();
        taps.expect_create_virtual_interface()
            .returning(|_, _| Err(shell_failure()));
        switch.expect_add_port().times(1).returning(|_, _| Ok(()));
        switch
            .expect_set_port_action()
            .returning(|_, _, _| Ok(()));
        switch
            .expect_list_ports()
            .returning(|_| Ok(vec!["eth0".to_string()]));

        let tracked = reconciler(switch, taps)
            .create(&spec(PortAction::Up))
            .await
            .unwrap();
        assert_eq!(tracked.id, id::encode("br0", "eth0"));
    }

    #[tokio::test]
    async fn test_create_add_port_failure_is_fatal() {
        let mut switch = MockSwitchAdapter::new();
        switch
            .expect_add_port()
            .returning(|_, _| Err(shell_failure()));
        switch.expect_set_port_action().never();
        switch.expect_list_ports().never();

        let err = reconciler(switch, lenient_taps())
            .create(&spec(PortAction::Up))
            .await
            .unwrap_err();
        assert!(matches!(err, CfgMgrError::Operation { op: "add-port", .. }));
    }

    #[tokio::test]
    async fn test_create_action_failure_is_advisory() {
        let mut switch = MockSwitchAdapter::new();
        switch.expect_add_port().returning(|_, _| Ok(()));
        switch
            .expect_set_port_action()
            .returning(|_, _, _| Err(shell_failure()));
        switch
            .expect_list_ports()
            .returning(|_| Ok(vec!["eth0".to_string()]));

        let tracked = reconciler(switch, lenient_taps())
            .create(&spec(PortAction::Down))
            .await
            .unwrap();
        assert!(tracked.is_present());
        assert_eq!(tracked.last_known_config.action, PortAction::Up);
    }

    #[tokio::test]
    async fn test_read_uses_desired_fields_before_first_create() {
        let mut switch = MockSwitchAdapter::new();
        switch
            .expect_list_ports()
            .withf(|b| b == "br0")
            .returning(|_| Ok(vec!["eth0".to_string(), "eth1".to_string()]));

        let mut tracked = TrackedResource::unmanaged(spec(PortAction::Up));
        let observed = reconciler(switch, lenient_taps())
            .read(&mut tracked)
            .await
            .unwrap();
        assert_eq!(observed, Observed::Present);
        assert_eq!(tracked.id, "br0:eth0");
    }

    #[tokio::test]
    async fn test_read_decodes_tracked_id() {
        let mut switch = MockSwitchAdapter::new();
        switch
            .expect_list_ports()
            .withf(|b| b == "br9")
            .returning(|_| Ok(vec!["tap9".to_string()]));

        let mut tracked = TrackedResource::present("br9:tap9", spec(PortAction::NoFlood));
        reconciler(switch, lenient_taps())
            .read(&mut tracked)
            .await
            .unwrap();
        assert_eq!(tracked.last_known_config.bridge_name, "br9");
        assert_eq!(tracked.last_known_config.name, "tap9");
        assert_eq!(tracked.last_known_config.action, PortAction::NoFlood);
    }

    #[tokio::test]
    async fn test_read_parent_unavailable_clears_id() {
        let mut switch = MockSwitchAdapter::new();
        switch
            .expect_list_ports()
            .returning(|_| Err(shell_failure()));

        let mut tracked = TrackedResource::present("br0:eth0", spec(PortAction::Up));
        let observed = reconciler(switch, lenient_taps())
            .read(&mut tracked)
            .await
            .unwrap();
        assert_eq!(observed, Observed::Absent(Absence::ParentUnavailable));
        assert!(tracked.id.is_empty());
    }

    #[tokio::test]
    async fn test_read_missing_port_clears_id() {
        let mut switch = MockSwitchAdapter::new();
        switch
            .expect_list_ports()
            .returning(|_| Ok(vec!["eth1".to_string()]));

        let mut tracked = TrackedResource::present("br0:eth0", spec(PortAction::Up));
        let observed = reconciler(switch, lenient_taps())
            .read(&mut tracked)
            .await
            .unwrap();
        assert_eq!(observed, Observed::Absent(Absence::NotFound));
        assert!(!tracked.is_present());
    }

    #[tokio::test]
    async fn test_read_malformed_id_is_validation_error() {
        let mut switch = MockSwitchAdapter::new();
        switch.expect_list_ports().never();

        let mut tracked = TrackedResource::present("br0-eth0", spec(PortAction::Up));
        let err = reconciler(switch, lenient_taps())
            .read(&mut tracked)
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_read_is_idempotent() {
        let mut switch = MockSwitchAdapter::new();
        switch
            .expect_list_ports()
            .times(2)
            .returning(|_| Ok(vec!["eth0".to_string()]));

        let reconciler = reconciler(switch, lenient_taps());
        let mut tracked = TrackedResource::present("br0:eth0", spec(PortAction::Stp));
        reconciler.read(&mut tracked).await.unwrap();
        let first = tracked.clone();
        reconciler.read(&mut tracked).await.unwrap();
        assert_eq!(tracked, first);
    }

    #[tokio::test]
    async fn test_update_applies_action() {
        let mut switch = MockSwitchAdapter::new();
        switch
            .expect_set_port_action()
            .withf(|b, p, a| b == "br0" && p == "eth0" && *a == PortAction::Down)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut tracked = TrackedResource::present("br0:eth0", spec(PortAction::Up));
        reconciler(switch, lenient_taps())
            .update(&mut tracked, &spec(PortAction::Down))
            .await
            .unwrap();
        assert_eq!(tracked.last_known_config.action, PortAction::Down);
    }

    #[tokio::test]
    async fn test_update_failure_is_fatal() {
        let mut switch = MockSwitchAdapter::new();
        switch
            .expect_set_port_action()
            .returning(|_, _, _| Err(shell_failure()));

        let mut tracked = TrackedResource::present("br0:eth0", spec(PortAction::Up));
        let err = reconciler(switch, lenient_taps())
            .update(&mut tracked, &spec(PortAction::Down))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CfgMgrError::Operation {
                op: "set-port-action",
                ..
            }
        ));
        assert_eq!(tracked.last_known_config.action, PortAction::Up);
    }

    #[tokio::test]
    async fn test_update_rejects_bridge_change() {
        let mut switch = MockSwitchAdapter::new();
        switch.expect_set_port_action().never();

        let mut moved = spec(PortAction::Up);
        moved.bridge_name = "br1".into();
        let mut tracked = TrackedResource::present("br0:eth0", spec(PortAction::Up));
        let err = reconciler(switch, lenient_taps())
            .update(&mut tracked, &moved)
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_delete_tap_failure_is_advisory() {
        let mut switch = MockSwitchAdapter::new();
        let mut taps = MockInterfaceAdapter::new();
        taps.expect_delete_virtual_interface()
            .returning(|_| Err(shell_failure()));
        switch
            .expect_delete_port()
            .withf(|b, p| b == "br0" && p == "eth0")
            .times(1)
            .returning(|_, _| Ok(()));

        let mut tracked = TrackedResource::present("br0:eth0", spec(PortAction::Up));
        reconciler(switch, taps)
            .delete(&mut tracked)
            .await
            .unwrap();
        assert!(!tracked.is_present());
    }

    #[tokio::test]
    async fn test_delete_port_failure_is_fatal() {
        let mut switch = MockSwitchAdapter::new();
        switch
            .expect_delete_port()
            .returning(|_, _| Err(shell_failure()));

        let mut tracked = TrackedResource::present("br0:eth0", spec(PortAction::Up));
        let err = reconciler(switch, lenient_taps())
            .delete(&mut tracked)
            .await
            .unwrap_err();
        assert!(matches!(err, CfgMgrError::Operation { op: "delete-port", .. }));
        assert_eq!(tracked.id, "br0:eth0");
    }
}
