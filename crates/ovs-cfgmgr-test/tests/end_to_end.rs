//! End-to-end reconciler tests against the fake switch
//!
//! Drives the bridge and port reconcilers directly, the way the orchestrator
//! does, and checks both the tracked records and the switch contents.

use std::sync::Arc;

use pretty_assertions::assert_eq;

use ovs_cfgmgr_common::{Absence, CfgMgrError, Observed, Reconciler, TrackedResource};
use ovs_cfgmgr_test::{
    fixtures::{bridge_fixtures, port_fixtures},
    Call, CallVerifier, FakeSwitch, Op, SwitchVerifier, TAP_OWNER,
};
use ovs_switchmgrd::{BridgeReconciler, PortAction, PortReconciler, ProtocolVersion};

fn reconcilers(fake: &Arc<FakeSwitch>) -> (BridgeReconciler, PortReconciler) {
    (
        BridgeReconciler::new(fake.clone()),
        PortReconciler::new(fake.clone(), fake.clone(), TAP_OWNER),
    )
}

/// Scenario:
/// 1. Create bridge br0 (OpenFlow13), then port eth0 (up)
/// 2. Delete the port, then the bridge
/// 3. Verify ids, switch contents and the calls issued
#[tokio::test]
async fn test_bridge_and_port_lifecycle() {
    let fake = Arc::new(FakeSwitch::new());
    let (bridges, ports) = reconcilers(&fake);

    let mut bridge = bridges
        .create(&bridge_fixtures::bridge("br0"))
        .await
        .expect("bridge create failed");
    assert_eq!(bridge.id, "br0");

    let mut port = ports
        .create(&port_fixtures::port("br0", "eth0"))
        .await
        .expect("port create failed");
    assert_eq!(port.id, "br0:eth0");

    let verifier = SwitchVerifier::new(&fake);
    verifier.assert_bridge("br0").unwrap();
    verifier.assert_port("br0", "eth0", PortAction::Up).unwrap();
    assert_eq!(fake.tap_owner("eth0").as_deref(), Some(TAP_OWNER));
    assert_eq!(
        fake.bridge_protocols("br0"),
        Some(vec![ProtocolVersion::OpenFlow13])
    );

    ports.delete(&mut port).await.expect("port delete failed");
    assert!(port.id.is_empty());
    bridges
        .delete(&mut bridge)
        .await
        .expect("bridge delete failed");
    assert!(bridge.id.is_empty());

    verifier.assert_no_bridge("br0").unwrap();
    assert_eq!(fake.tap_owner("eth0"), None);

    let calls = CallVerifier::new(fake.calls());
    calls
        .assert_called(&Call::SetBridgeProtocols(
            "br0".into(),
            vec![ProtocolVersion::OpenFlow13],
        ))
        .unwrap();
    calls
        .assert_called(&Call::SetPortAction(
            "br0".into(),
            "eth0".into(),
            PortAction::Up,
        ))
        .unwrap();
    calls
        .assert_before(
            &Call::AddBridge("br0".into()),
            &Call::AddPort("br0".into(), "eth0".into()),
        )
        .unwrap();
    calls
        .assert_before(
            &Call::DeletePort("br0".into(), "eth0".into()),
            &Call::DeleteBridge("br0".into()),
        )
        .unwrap();
}

/// A leftover tap makes tap creation fail; the port is still created.
#[tokio::test]
async fn test_tap_failure_does_not_block_port() {
    let fake = Arc::new(FakeSwitch::new());
    fake.seed_bridge("br0");
    fake.seed_tap("eth0", "someone-else");
    let (_, ports) = reconcilers(&fake);

    let tracked = ports
        .create(&port_fixtures::port("br0", "eth0"))
        .await
        .expect("port create failed");

    assert_eq!(tracked.id, "br0:eth0");
    SwitchVerifier::new(&fake)
        .assert_port("br0", "eth0", PortAction::Up)
        .unwrap();
}

/// An action failure during create is advisory; the port is recorded as up.
#[tokio::test]
async fn test_action_failure_during_create_is_advisory() {
    let fake = Arc::new(FakeSwitch::new());
    fake.seed_bridge("br0");
    fake.fail(Op::SetPortAction);
    let (_, ports) = reconcilers(&fake);

    let tracked = ports
        .create(&port_fixtures::port_with_action("br0", "eth0", PortAction::NoFlood))
        .await
        .expect("port create failed");

    assert_eq!(tracked.id, "br0:eth0");
    assert_eq!(tracked.last_known_config.action, PortAction::Up);
}

/// AddPort onto a missing bridge is fatal and nothing is tracked.
#[tokio::test]
async fn test_add_port_without_bridge_is_fatal() {
    let fake = Arc::new(FakeSwitch::new());
    let (_, ports) = reconcilers(&fake);

    let err = ports
        .create(&port_fixtures::port("br0", "eth0"))
        .await
        .unwrap_err();

    assert!(matches!(err, CfgMgrError::Operation { op: "add-port", .. }));
    assert!(err.is_retryable());
    CallVerifier::new(fake.calls())
        .assert_not_called(Op::SetPortAction)
        .unwrap();
}

/// A protocol failure leaves the bridge on the switch; a retry succeeds.
#[tokio::test]
async fn test_bridge_protocol_failure_then_retry() {
    let fake = Arc::new(FakeSwitch::new());
    fake.fail(Op::SetBridgeProtocols);
    let (bridges, _) = reconcilers(&fake);
    let spec = bridge_fixtures::bridge_with_protocols(
        "br0",
        &[ProtocolVersion::OpenFlow10, ProtocolVersion::OpenFlow15],
    );

    assert!(bridges.create(&spec).await.is_err());
    assert!(fake.has_bridge("br0"));

    fake.heal(Op::SetBridgeProtocols);
    let tracked = bridges.create(&spec).await.expect("retry failed");
    assert_eq!(tracked.id, "br0");
    assert_eq!(
        fake.bridge_protocols("br0"),
        Some(vec![ProtocolVersion::OpenFlow10, ProtocolVersion::OpenFlow15])
    );
}

/// Reading twice without changes issues only queries and keeps the record.
#[tokio::test]
async fn test_read_is_idempotent() {
    let fake = Arc::new(FakeSwitch::new());
    let (bridges, ports) = reconcilers(&fake);
    let mut bridge = bridges
        .create(&bridge_fixtures::bridge("br0"))
        .await
        .unwrap();
    let mut port = ports
        .create(&port_fixtures::port("br0", "eth0"))
        .await
        .unwrap();
    fake.clear_calls();

    let bridge_before = bridge.clone();
    let port_before = port.clone();
    for _ in 0..2 {
        assert_eq!(bridges.read(&mut bridge).await.unwrap(), Observed::Present);
        assert_eq!(ports.read(&mut port).await.unwrap(), Observed::Present);
    }

    assert_eq!(bridge, bridge_before);
    assert_eq!(port, port_before);
    CallVerifier::new(fake.calls()).assert_read_only().unwrap();
}

/// Port read after its bridge vanished clears the id without error.
#[tokio::test]
async fn test_port_read_with_missing_parent() {
    let fake = Arc::new(FakeSwitch::new());
    let (_, ports) = reconcilers(&fake);
    let mut tracked =
        TrackedResource::present("br0:eth0", port_fixtures::port("br0", "eth0"));

    let observed = ports.read(&mut tracked).await.expect("read failed");

    assert_eq!(observed, Observed::Absent(Absence::ParentUnavailable));
    assert!(tracked.id.is_empty());
}

/// Bridge read on a nonexistent bridge clears the id without error.
#[tokio::test]
async fn test_bridge_read_when_gone() {
    let fake = Arc::new(FakeSwitch::new());
    let (bridges, _) = reconcilers(&fake);
    let mut tracked = bridges
        .create(&bridge_fixtures::bridge("br0"))
        .await
        .unwrap();
    fake.remove_bridge_externally("br0");

    let observed = bridges.read(&mut tracked).await.unwrap();
    assert_eq!(observed, Observed::Absent(Absence::NotFound));
    assert!(tracked.id.is_empty());
}

/// Update applies a new action in place.
#[tokio::test]
async fn test_port_update_changes_action() {
    let fake = Arc::new(FakeSwitch::new());
    let (bridges, ports) = reconcilers(&fake);
    bridges
        .create(&bridge_fixtures::bridge("br0"))
        .await
        .unwrap();
    let mut tracked = ports
        .create(&port_fixtures::port("br0", "eth0"))
        .await
        .unwrap();

    let desired = port_fixtures::port_with_action("br0", "eth0", PortAction::Down);
    ports.update(&mut tracked, &desired).await.unwrap();

    assert_eq!(tracked.last_known_config, desired);
    SwitchVerifier::new(&fake)
        .assert_port("br0", "eth0", PortAction::Down)
        .unwrap();
}

/// Deleting a port whose tap is already gone still detaches it.
#[tokio::test]
async fn test_port_delete_with_missing_tap() {
    let fake = Arc::new(FakeSwitch::new());
    fake.seed_bridge("br0");
    let (_, ports) = reconcilers(&fake);
    let mut tracked = ports
        .create(&port_fixtures::port("br0", "eth0"))
        .await
        .unwrap();
    fake.fail(Op::DeleteTap);

    ports.delete(&mut tracked).await.expect("delete failed");

    assert!(tracked.id.is_empty());
    SwitchVerifier::new(&fake)
        .assert_no_port("br0", "eth0")
        .unwrap();
}
