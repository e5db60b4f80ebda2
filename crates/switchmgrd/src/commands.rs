//! Shell command builders for bridge, port and tap operations

use ovs_cfgmgr_common::shell::{CommandLine, IP_CMD, OVS_OFCTL_CMD, OVS_VSCTL_CMD};

use crate::types::{PortAction, ProtocolVersion};

/// Exit code `ovs-vsctl br-exists` uses for a missing bridge
pub const BR_EXISTS_ABSENT_EXIT_CODE: i32 = 2;

fn vsctl(sudo: bool) -> CommandLine {
    CommandLine::new(OVS_VSCTL_CMD).sudo(sudo)
}

fn join_protocols<'a, I>(protocols: I) -> String
where
    I: IntoIterator<Item = &'a ProtocolVersion>,
{
    protocols
        .into_iter()
        .map(ProtocolVersion::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Build add bridge command
pub fn build_add_bridge_cmd(sudo: bool, bridge: &str) -> CommandLine {
    vsctl(sudo).args(["--may-exist", "add-br", bridge])
}

/// Build delete bridge command
pub fn build_delete_bridge_cmd(sudo: bool, bridge: &str) -> CommandLine {
    vsctl(sudo).args(["--if-exists", "del-br", bridge])
}

/// Build bridge existence query
pub fn build_bridge_exists_cmd(sudo: bool, bridge: &str) -> CommandLine {
    vsctl(sudo).args(["br-exists", bridge])
}

/// Build set bridge protocols command
pub fn build_set_bridge_protocols_cmd<'a, I>(sudo: bool, bridge: &str, protocols: I) -> CommandLine
where
    I: IntoIterator<Item = &'a ProtocolVersion>,
{
    vsctl(sudo)
        .args(["set", "bridge", bridge])
        .arg(format!("protocols={}", join_protocols(protocols)))
}

/// Build add port command
pub fn build_add_port_cmd(sudo: bool, bridge: &str, port: &str) -> CommandLine {
    vsctl(sudo).args(["--may-exist", "add-port", bridge, port])
}

/// Build delete port command
pub fn build_delete_port_cmd(sudo: bool, bridge: &str, port: &str) -> CommandLine {
    vsctl(sudo).args(["--if-exists", "del-port", bridge, port])
}

/// Build list ports command
pub fn build_list_ports_cmd(sudo: bool, bridge: &str) -> CommandLine {
    vsctl(sudo).args(["list-ports", bridge])
}

/// Build port action command
///
/// `protocols` is the client-wide OpenFlow version set, so `ovs-ofctl` can
/// negotiate with bridges configured for any of them.
pub fn build_mod_port_cmd<'a, I>(
    sudo: bool,
    protocols: I,
    bridge: &str,
    port: &str,
    action: PortAction,
) -> CommandLine
where
    I: IntoIterator<Item = &'a ProtocolVersion>,
{
    CommandLine::new(OVS_OFCTL_CMD)
        .sudo(sudo)
        .arg(format!("--protocols={}", join_protocols(protocols)))
        .args(["mod-port", bridge, port, action.as_str()])
}

/// Build tap creation command
pub fn build_add_tap_cmd(sudo: bool, name: &str, owner: &str) -> CommandLine {
    CommandLine::new(IP_CMD)
        .sudo(sudo)
        .args(["tuntap", "add", "dev", name, "mode", "tap", "user", owner])
}

/// Build tap removal command
pub fn build_delete_tap_cmd(sudo: bool, name: &str) -> CommandLine {
    CommandLine::new(IP_CMD)
        .sudo(sudo)
        .args(["tuntap", "del", "dev", name, "mode", "tap"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{port_action, ProtocolVersions};

    #[test]
    fn test_build_add_bridge_cmd() {
        let cmd = build_add_bridge_cmd(false, "br0").render();
        assert_eq!(
            cmd,
            "/usr/bin/ovs-vsctl \"--may-exist\" \"add-br\" \"br0\""
        );
    }

    #[test]
    fn test_build_delete_bridge_cmd_with_sudo() {
        let cmd = build_delete_bridge_cmd(true, "br0").render();
        assert!(cmd.starts_with("/usr/bin/sudo /usr/bin/ovs-vsctl"));
        assert!(cmd.contains("\"del-br\" \"br0\""));
    }

    #[test]
    fn test_build_set_bridge_protocols_cmd() {
        let versions =
            ProtocolVersions::from([ProtocolVersion::OpenFlow13, ProtocolVersion::OpenFlow10]);
        let cmd = build_set_bridge_protocols_cmd(false, "br0", &versions).render();
        assert!(cmd.contains("\"set\" \"bridge\" \"br0\""));
        assert!(cmd.ends_with("\"protocols=OpenFlow10,OpenFlow13\""));
    }

    #[test]
    fn test_build_port_cmds() {
        let add = build_add_port_cmd(false, "br0", "eth0").render();
        assert!(add.contains("\"add-port\" \"br0\" \"eth0\""));

        let del = build_delete_port_cmd(false, "br0", "eth0").render();
        assert!(del.contains("\"--if-exists\" \"del-port\" \"br0\" \"eth0\""));

        let list = build_list_ports_cmd(false, "br0").render();
        assert!(list.ends_with("\"list-ports\" \"br0\""));
    }

    #[test]
    fn test_build_mod_port_cmd() {
        let cmd = build_mod_port_cmd(
            true,
            &ProtocolVersion::ALL,
            "br0",
            "eth0",
            PortAction::NoFlood,
        )
        .render();
        assert!(cmd.starts_with("/usr/bin/sudo /usr/bin/ovs-ofctl"));
        assert!(cmd.contains(
            "--protocols=OpenFlow10,OpenFlow11,OpenFlow12,OpenFlow13,OpenFlow14,OpenFlow15"
        ));
        assert!(cmd.ends_with("\"mod-port\" \"br0\" \"eth0\" \"no-flood\""));
    }

    #[test]
    fn test_no_receive_stp_keyword_is_emitted_unchanged() {
        let cmd = build_mod_port_cmd(
            false,
            &ProtocolVersions::new(),
            "br0",
            "eth0",
            port_action("no-receive-stp"),
        )
        .render();
        assert!(cmd.ends_with("\"mod-port\" \"br0\" \"eth0\" \"no-receive-stp\""));
        assert!(!cmd.contains("\"receive-stp\""));
    }

    #[test]
    fn test_build_tap_cmds() {
        let add = build_add_tap_cmd(true, "tap0", "alice").render();
        assert_eq!(
            add,
            "/usr/bin/sudo /sbin/ip \"tuntap\" \"add\" \"dev\" \"tap0\" \"mode\" \"tap\" \"user\" \"alice\""
        );
        let del = build_delete_tap_cmd(false, "tap0").render();
        assert!(del.ends_with("\"del\" \"dev\" \"tap0\" \"mode\" \"tap\""));
    }

    #[test]
    fn test_names_are_quoted() {
        let cmd = build_add_port_cmd(false, "br0", "eth0; reboot").render();
        assert!(cmd.ends_with("\"eth0; reboot\""));
    }
}
