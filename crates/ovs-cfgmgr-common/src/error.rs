//! Error types for switch reconciliation.
//!
//! This module defines the error types used throughout the ovs cfgmgr crates.
//! All errors implement `std::error::Error` via `thiserror`.
//!
//! The variants fall into three groups:
//!
//! - validation errors (`InvalidConfig`, `MalformedIdentifier`), raised before
//!   any side effect is attempted
//! - fatal operation errors (`Operation`, `ShellExec`, `ShellCommandFailed`),
//!   raised when a control-plane mutation that defines a resource fails
//! - local persistence errors (`State`, `Config`)
//!
//! Absence of a resource is never an error.

use std::io;
use thiserror::Error;

/// Result type alias for cfgmgr operations.
pub type CfgMgrResult<T> = Result<T, CfgMgrError>;

/// Errors that can occur during cfgmgr operations.
#[derive(Debug, Error)]
pub enum CfgMgrError {
    /// Failed to execute a shell command (spawn error).
    #[error("Failed to execute shell command '{command}': {source}")]
    ShellExec {
        /// The command that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Shell command returned non-zero exit code.
    #[error("Shell command failed: '{command}' (exit code {exit_code}): {output}")]
    ShellCommandFailed {
        /// The command that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// A control-plane operation that defines a resource failed.
    #[error("{op} failed for '{target}': {source}")]
    Operation {
        /// The adapter operation (e.g., "add-port").
        op: &'static str,
        /// The bridge or port the operation targeted.
        target: String,
        /// The underlying adapter error.
        #[source]
        source: Box<CfgMgrError>,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Compound identifier could not be decoded.
    #[error("Malformed identifier '{id}': expected '<bridge>:<port>'")]
    MalformedIdentifier {
        /// The identifier as stored.
        id: String,
    },

    /// Desired-state configuration file could not be loaded.
    #[error("Failed to load configuration from {path}: {message}")]
    Config {
        /// Path of the configuration file.
        path: String,
        /// Error message.
        message: String,
    },

    /// Tracked state file could not be read or written.
    #[error("State store error at {path}: {message}")]
    State {
        /// Path of the state file.
        path: String,
        /// Error message.
        message: String,
    },

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl CfgMgrError {
    /// Wraps an adapter error as a fatal operation error.
    pub fn operation(op: &'static str, target: impl Into<String>, source: CfgMgrError) -> Self {
        Self::Operation {
            op,
            target: target.into(),
            source: Box::new(source),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a malformed identifier error.
    pub fn malformed_identifier(id: impl Into<String>) -> Self {
        Self::MalformedIdentifier { id: id.into() }
    }

    /// Creates a configuration file error.
    pub fn config(path: impl Into<String>, message: impl ToString) -> Self {
        Self::Config {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Creates a state store error.
    pub fn state(path: impl Into<String>, message: impl ToString) -> Self {
        Self::State {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true for errors raised by input validation, before any
    /// side effect took place.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CfgMgrError::InvalidConfig { .. } | CfgMgrError::MalformedIdentifier { .. }
        )
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            CfgMgrError::ShellCommandFailed { .. } => true,
            CfgMgrError::Operation { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}
