//! Shell command execution for the switch and tap tooling.
//!
//! Every command line is assembled through [`CommandLine`], which quotes each
//! argument so that bridge and port names coming from user configuration can
//! never inject extra shell syntax.
//!
//! # Example
//!
//! ```ignore
//! use ovs_cfgmgr_common::shell::{self, CommandLine, OVS_VSCTL_CMD};
//!
//! let cmd = CommandLine::new(OVS_VSCTL_CMD).arg("list-ports").arg("br0");
//! let ports = shell::exec_or_throw(&cmd.render()).await?;
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{CfgMgrError, CfgMgrResult};

/// Path to the `ovs-vsctl` database client.
pub const OVS_VSCTL_CMD: &str = "/usr/bin/ovs-vsctl";

/// Path to the `ovs-ofctl` OpenFlow client.
pub const OVS_OFCTL_CMD: &str = "/usr/bin/ovs-ofctl";

/// Path to the `ip` command for tap device management.
pub const IP_CMD: &str = "/sbin/ip";

/// Path to `sudo` for privilege escalation.
pub const SUDO_CMD: &str = "/usr/bin/sudo";

/// Characters that need escaping inside shell double-quotes:
/// `$`, backtick, `"`, `\` and newline.
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

/// Quotes a string for safe use in shell commands.
///
/// # Example
///
/// ```
/// use ovs_cfgmgr_common::shell::shellquote;
///
/// assert_eq!(shellquote("br0"), "\"br0\"");
/// assert_eq!(shellquote("tap$1"), "\"tap\\$1\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// A program invocation with individually quoted arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    sudo: bool,
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    /// Starts a command line for `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            sudo: false,
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Runs the program through `sudo` when `enabled`.
    pub fn sudo(mut self, enabled: bool) -> Self {
        self.sudo = enabled;
        self
    }

    /// Appends a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Returns the program path.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the unquoted arguments.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Renders the command as a `/bin/sh -c` string with every argument quoted.
    pub fn render(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 2);
        if self.sudo {
            parts.push(SUDO_CMD.to_string());
        }
        parts.push(self.program.clone());
        parts.extend(self.args.iter().map(|a| shellquote(a)));
        parts.join(" ")
    }
}

/// Result of a shell command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// The exit code of the command (0 = success).
    pub exit_code: i32,
    /// The trimmed stdout output.
    pub stdout: String,
    /// The trimmed stderr output.
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns stdout split into non-empty trimmed lines.
    pub fn lines(&self) -> Vec<String> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Returns the combined output (stdout + stderr) for error messages.
    pub fn combined_output(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }

    /// Converts a non-zero exit into [`CfgMgrError::ShellCommandFailed`].
    pub fn into_result(self, cmd: &str) -> CfgMgrResult<ExecResult> {
        if self.success() {
            Ok(self)
        } else {
            Err(CfgMgrError::ShellCommandFailed {
                command: cmd.to_string(),
                exit_code: self.exit_code,
                output: self.combined_output(),
            })
        }
    }
}

/// Executes a shell command through `/bin/sh -c`.
///
/// A non-zero exit is not an error here; callers that need one use
/// [`exec_or_throw`] or [`ExecResult::into_result`].
pub async fn exec(cmd: &str) -> CfgMgrResult<ExecResult> {
    tracing::debug!(command = %cmd, "Executing shell command");

    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(cmd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| CfgMgrError::ShellExec {
            command: cmd.to_string(),
            source: e,
        })?;

    let result = ExecResult {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    };

    if result.success() {
        tracing::trace!(command = %cmd, "Command succeeded");
    } else {
        tracing::debug!(
            command = %cmd,
            exit_code = result.exit_code,
            stderr = %result.stderr,
            "Command exited non-zero"
        );
    }

    Ok(result)
}

/// Executes a shell command and fails on non-zero exit, returning stdout.
pub async fn exec_or_throw(cmd: &str) -> CfgMgrResult<String> {
    Ok(exec(cmd).await?.into_result(cmd)?.stdout)
}
