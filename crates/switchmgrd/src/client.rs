//! OvsClient - adapter implementation on top of the Open vSwitch CLI tools

use async_trait::async_trait;
use tracing::info;

use ovs_cfgmgr_common::shell::{self, CommandLine, ExecResult};
use ovs_cfgmgr_common::{CfgMgrError, CfgMgrResult};

use crate::adapter::{InterfaceAdapter, SwitchAdapter};
use crate::commands::{
    build_add_bridge_cmd, build_add_port_cmd, build_add_tap_cmd, build_bridge_exists_cmd,
    build_delete_bridge_cmd, build_delete_port_cmd, build_delete_tap_cmd, build_list_ports_cmd,
    build_mod_port_cmd, build_set_bridge_protocols_cmd, BR_EXISTS_ABSENT_EXIT_CODE,
};
use crate::types::{PortAction, ProtocolVersion, ProtocolVersions};

/// Connection settings fixed for the lifetime of a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Run every command through sudo
    pub sudo: bool,
    /// OpenFlow versions `ovs-ofctl` may negotiate
    pub protocols: ProtocolVersions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            sudo: true,
            protocols: ProtocolVersion::ALL.into_iter().collect(),
        }
    }
}

/// Shell-backed switch and tap adapter.
///
/// Constructed once and shared by reference with every reconciler.
pub struct OvsClient {
    options: ClientOptions,

    /// Mock mode for testing
    #[cfg(test)]
    mock_mode: bool,

    /// Captured commands in mock mode
    #[cfg(test)]
    captured_commands: std::sync::Mutex<Vec<String>>,

    /// Scripted results in mock mode: (command substring, exit code, stdout)
    #[cfg(test)]
    mock_responses: Vec<(String, i32, String)>,
}

impl OvsClient {
    /// Creates a client with the given options
    pub fn new(options: ClientOptions) -> Self {
        info!(
            sudo = options.sudo,
            protocols = ?options.protocols,
            "Creating Open vSwitch client"
        );
        Self {
            options,
            #[cfg(test)]
            mock_mode: false,
            #[cfg(test)]
            captured_commands: std::sync::Mutex::new(Vec::new()),
            #[cfg(test)]
            mock_responses: Vec::new(),
        }
    }

    /// Enables mock mode for testing
    #[cfg(test)]
    pub fn with_mock_mode(mut self) -> Self {
        self.mock_mode = true;
        self
    }

    /// Scripts the result of any command containing `pattern` (mock mode)
    #[cfg(test)]
    pub fn with_mock_response(
        mut self,
        pattern: impl Into<String>,
        exit_code: i32,
        stdout: impl Into<String>,
    ) -> Self {
        self.mock_responses
            .push((pattern.into(), exit_code, stdout.into()));
        self
    }

    /// Gets captured commands (for testing)
    #[cfg(test)]
    pub fn captured_commands(&self) -> Vec<String> {
        self.captured_commands
            .lock()
            .map(|cmds| cmds.clone())
            .unwrap_or_default()
    }

    /// Execute a command line (with mock mode support)
    async fn run(&self, cmd: CommandLine) -> CfgMgrResult<(String, ExecResult)> {
        let rendered = cmd.render();

        #[cfg(test)]
        if self.mock_mode {
            if let Ok(mut cmds) = self.captured_commands.lock() {
                cmds.push(rendered.clone());
            }
            tracing::debug!("Mock exec: {}", rendered);
            let (exit_code, stdout) = self
                .mock_responses
                .iter()
                .find(|(pattern, _, _)| rendered.contains(pattern.as_str()))
                .map(|(_, code, out)| (*code, out.clone()))
                .unwrap_or((0, String::new()));
            let result = ExecResult {
                exit_code,
                stdout,
                stderr: String::new(),
            };
            return Ok((rendered, result));
        }

        let result = shell::exec(&rendered).await?;
        Ok((rendered, result))
    }

    /// Execute a command line and fail on non-zero exit
    async fn run_checked(&self, cmd: CommandLine) -> CfgMgrResult<ExecResult> {
        let (rendered, result) = self.run(cmd).await?;
        result.into_result(&rendered)
    }
}

#[async_trait]
impl SwitchAdapter for OvsClient {
    async fn add_bridge(&self, bridge: &str) -> CfgMgrResult<()> {
        self.run_checked(build_add_bridge_cmd(self.options.sudo, bridge))
            .await?;
        Ok(())
    }

    async fn set_bridge_protocols(
        &self,
        bridge: &str,
        protocols: &[ProtocolVersion],
    ) -> CfgMgrResult<()> {
        self.run_checked(build_set_bridge_protocols_cmd(
            self.options.sudo,
            bridge,
            protocols,
        ))
        .await?;
        Ok(())
    }

    async fn delete_bridge(&self, bridge: &str) -> CfgMgrResult<()> {
        self.run_checked(build_delete_bridge_cmd(self.options.sudo, bridge))
            .await?;
        Ok(())
    }

    async fn bridge_exists(&self, bridge: &str) -> CfgMgrResult<bool> {
        let (rendered, result) = self
            .run(build_bridge_exists_cmd(self.options.sudo, bridge))
            .await?;
        match result.exit_code {
            0 => Ok(true),
            BR_EXISTS_ABSENT_EXIT_CODE => Ok(false),
            _ => Err(CfgMgrError::ShellCommandFailed {
                command: rendered,
                exit_code: result.exit_code,
                output: result.combined_output(),
            }),
        }
    }

    async fn add_port(&self, bridge: &str, port: &str) -> CfgMgrResult<()> {
        self.run_checked(build_add_port_cmd(self.options.sudo, bridge, port))
            .await?;
        Ok(())
    }

    async fn delete_port(&self, bridge: &str, port: &str) -> CfgMgrResult<()> {
        self.run_checked(build_delete_port_cmd(self.options.sudo, bridge, port))
            .await?;
        Ok(())
    }

    async fn list_ports(&self, bridge: &str) -> CfgMgrResult<Vec<String>> {
        let result = self
            .run_checked(build_list_ports_cmd(self.options.sudo, bridge))
            .await?;
        Ok(result.lines())
    }

    async fn set_port_action(
        &self,
        bridge: &str,
        port: &str,
        action: PortAction,
    ) -> CfgMgrResult<()> {
        self.run_checked(build_mod_port_cmd(
            self.options.sudo,
            &self.options.protocols,
            bridge,
            port,
            action,
        ))
        .await?;
        Ok(())
    }
}

#[async_trait]
impl InterfaceAdapter for OvsClient {
    async fn create_virtual_interface(&self, name: &str, owner: &str) -> CfgMgrResult<()> {
        self.run_checked(build_add_tap_cmd(self.options.sudo, name, owner))
            .await?;
        Ok(())
    }

    async fn delete_virtual_interface(&self, name: &str) -> CfgMgrResult<()> {
        self.run_checked(build_delete_tap_cmd(self.options.sudo, name))
            .await?;
        Ok(())
    }
}

/// Returns the login name of the invoking user, used as tap owner.
pub fn current_user() -> CfgMgrResult<String> {
    let uid = nix::unistd::getuid();
    match nix::unistd::User::from_uid(uid) {
        Ok(Some(user)) => Ok(user.name),
        Ok(None) => Err(CfgMgrError::internal(format!(
            "no passwd entry for uid {}",
            uid
        ))),
        Err(e) => Err(CfgMgrError::internal(format!(
            "failed to look up uid {}: {}",
            uid, e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_client() -> OvsClient {
        OvsClient::new(ClientOptions {
            sudo: false,
            protocols: ProtocolVersions::from([ProtocolVersion::OpenFlow13]),
        })
        .with_mock_mode()
    }

    #[test]
    fn test_default_options() {
        let options = ClientOptions::default();
        assert!(options.sudo);
        assert_eq!(options.protocols.len(), 6);
    }

    #[tokio::test]
    async fn test_add_bridge_and_protocols() {
        let client = mock_client();
        client.add_bridge("br0").await.unwrap();
        client
            .set_bridge_protocols("br0", &[ProtocolVersion::OpenFlow13])
            .await
            .unwrap();

        let cmds = client.captured_commands();
        assert_eq!(cmds.len(), 2);
        assert!(cmds[0].contains("\"add-br\" \"br0\""));
        assert!(cmds[1].contains("\"protocols=OpenFlow13\""));
    }

    #[tokio::test]
    async fn test_bridge_exists_exit_codes() {
        let present = mock_client();
        assert!(present.bridge_exists("br0").await.unwrap());

        let absent = mock_client().with_mock_response("br-exists", 2, "");
        assert!(!absent.bridge_exists("br0").await.unwrap());

        let broken = mock_client().with_mock_response("br-exists", 1, "");
        assert!(matches!(
            broken.bridge_exists("br0").await,
            Err(CfgMgrError::ShellCommandFailed { exit_code: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_list_ports_parses_lines() {
        let client = mock_client().with_mock_response("list-ports", 0, "eth0\neth1\n");
        let ports = client.list_ports("br0").await.unwrap();
        assert_eq!(ports, vec!["eth0".to_string(), "eth1".to_string()]);
    }

    #[tokio::test]
    async fn test_list_ports_failure_is_error() {
        let client = mock_client().with_mock_response("list-ports", 1, "");
        assert!(client.list_ports("br0").await.is_err());
    }

    #[tokio::test]
    async fn test_set_port_action_uses_client_protocols() {
        let client = mock_client();
        client
            .set_port_action("br0", "eth0", PortAction::Down)
            .await
            .unwrap();

        let cmds = client.captured_commands();
        assert!(cmds[0].contains("--protocols=OpenFlow13"));
        assert!(cmds[0].ends_with("\"mod-port\" \"br0\" \"eth0\" \"down\""));
    }

    #[tokio::test]
    async fn test_tap_commands() {
        let client = mock_client();
        client
            .create_virtual_interface("eth0", "alice")
            .await
            .unwrap();
        client.delete_virtual_interface("eth0").await.unwrap();

        let cmds = client.captured_commands();
        assert!(cmds[0].contains("\"tuntap\" \"add\""));
        assert!(cmds[0].ends_with("\"user\" \"alice\""));
        assert!(cmds[1].contains("\"tuntap\" \"del\""));
    }

    #[tokio::test]
    async fn test_failed_command_is_error() {
        let client = mock_client().with_mock_response("add-port", 1, "");
        assert!(client.add_port("br0", "eth0").await.is_err());
    }
}
