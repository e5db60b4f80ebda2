//! Test fixtures for common switch layouts

use std::sync::Arc;

use ovs_switchmgrd::{
    BridgeSpec, DesiredState, Orchestrator, PortAction, PortSpec, ProtocolVersion,
    ProtocolVersions,
};

use crate::fake::FakeSwitch;

/// Owner given to every tap created through [`orchestrator`]
pub const TAP_OWNER: &str = "ovs-test";

/// Bridge fixtures
pub mod bridge_fixtures {
    use super::*;

    /// Bridge speaking the default protocol (OpenFlow13)
    pub fn bridge(name: &str) -> BridgeSpec {
        bridge_with_protocols(name, &[ProtocolVersion::OpenFlow13])
    }

    pub fn bridge_with_protocols(name: &str, versions: &[ProtocolVersion]) -> BridgeSpec {
        BridgeSpec::new(name, versions.iter().copied().collect())
            .unwrap_or_else(|e| panic!("invalid bridge fixture {}: {}", name, e))
    }
}

/// Port fixtures
pub mod port_fixtures {
    use super::*;

    /// Port in the default `up` state
    pub fn port(bridge: &str, name: &str) -> PortSpec {
        port_with_action(bridge, name, PortAction::Up)
    }

    pub fn port_with_action(bridge: &str, name: &str, action: PortAction) -> PortSpec {
        PortSpec::new(name, bridge, action, ProtocolVersions::new())
            .unwrap_or_else(|e| panic!("invalid port fixture {}:{}: {}", bridge, name, e))
    }
}

/// Desired state with `br0` and ports `eth0`, `eth1` on it
pub fn single_bridge_layout() -> DesiredState {
    DesiredState {
        bridges: vec![bridge_fixtures::bridge("br0")],
        ports: vec![
            port_fixtures::port("br0", "eth0"),
            port_fixtures::port("br0", "eth1"),
        ],
    }
}

/// Desired state with `br0` (eth0, eth1) and `br1` (eth2 with no-forward)
pub fn two_bridge_layout() -> DesiredState {
    DesiredState {
        bridges: vec![
            bridge_fixtures::bridge("br0"),
            bridge_fixtures::bridge_with_protocols(
                "br1",
                &[ProtocolVersion::OpenFlow10, ProtocolVersion::OpenFlow14],
            ),
        ],
        ports: vec![
            port_fixtures::port("br0", "eth0"),
            port_fixtures::port("br0", "eth1"),
            port_fixtures::port_with_action("br1", "eth2", PortAction::NoForward),
        ],
    }
}

/// TOML configuration equivalent to [`single_bridge_layout`]
pub const SINGLE_BRIDGE_TOML: &str = r#"
[client]
sudo = false
tap_owner = "ovs-test"

[[bridge]]
name = "br0"
protocol_version = "OpenFlow13"

[[port]]
name = "eth0"
bridge_id = "br0"

[[port]]
name = "eth1"
bridge_id = "br0"
action = "up"
"#;

/// Orchestrator wired to `fake` for both switch and taps
pub fn orchestrator(fake: &Arc<FakeSwitch>) -> Orchestrator {
    Orchestrator::new(fake.clone(), fake.clone(), TAP_OWNER)
}
