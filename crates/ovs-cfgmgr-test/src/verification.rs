//! Verification helpers for the fake switch
//!
//! Assertions over the recorded call log and the resulting switch contents.

use thiserror::Error;

use ovs_switchmgrd::PortAction;

use crate::fake::{Call, FakeSwitch, Op};

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Expected call {expected} was not made; calls: {calls}")]
    CallNotMade { expected: String, calls: String },

    #[error("Unexpected call {call}")]
    UnexpectedCall { call: String },

    #[error("Expected {expected} calls of {op}, found {actual}")]
    CallCountMismatch {
        op: String,
        expected: usize,
        actual: usize,
    },

    #[error("Expected {first} before {second}")]
    OrderViolation { first: String, second: String },

    #[error("Expected bridge '{bridge}' to be {expected}")]
    BridgeMismatch { bridge: String, expected: String },

    #[error("Port {bridge}:{port}: expected {expected}, found {actual}")]
    PortMismatch {
        bridge: String,
        port: String,
        expected: String,
        actual: String,
    },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Call log verifier
pub struct CallVerifier {
    calls: Vec<Call>,
}

impl CallVerifier {
    pub fn new(calls: Vec<Call>) -> Self {
        Self { calls }
    }

    fn position(&self, call: &Call) -> Option<usize> {
        self.calls.iter().position(|c| c == call)
    }

    /// Verify that `call` was made
    pub fn assert_called(&self, call: &Call) -> VerifyResult<()> {
        match self.position(call) {
            Some(_) => Ok(()),
            None => Err(VerificationError::CallNotMade {
                expected: format!("{:?}", call),
                calls: format!("{:?}", self.calls),
            }),
        }
    }

    /// Verify that no call of kind `op` was made
    pub fn assert_not_called(&self, op: Op) -> VerifyResult<()> {
        match self.calls.iter().find(|c| c.op() == op) {
            Some(call) => Err(VerificationError::UnexpectedCall {
                call: format!("{:?}", call),
            }),
            None => Ok(()),
        }
    }

    /// Verify the number of calls of kind `op`
    pub fn assert_count(&self, op: Op, expected: usize) -> VerifyResult<()> {
        let actual = self.calls.iter().filter(|c| c.op() == op).count();
        if actual != expected {
            return Err(VerificationError::CallCountMismatch {
                op: format!("{:?}", op),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Verify that only read-only queries were made
    pub fn assert_read_only(&self) -> VerifyResult<()> {
        match self.calls.iter().find(|c| c.is_mutation()) {
            Some(call) => Err(VerificationError::UnexpectedCall {
                call: format!("{:?}", call),
            }),
            None => Ok(()),
        }
    }

    /// Verify that `first` was made before `second`
    pub fn assert_before(&self, first: &Call, second: &Call) -> VerifyResult<()> {
        self.assert_called(first)?;
        self.assert_called(second)?;
        match (self.position(first), self.position(second)) {
            (Some(a), Some(b)) if a < b => Ok(()),
            _ => Err(VerificationError::OrderViolation {
                first: format!("{:?}", first),
                second: format!("{:?}", second),
            }),
        }
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }
}

/// Switch contents verifier
pub struct SwitchVerifier<'a> {
    fake: &'a FakeSwitch,
}

impl<'a> SwitchVerifier<'a> {
    pub fn new(fake: &'a FakeSwitch) -> Self {
        Self { fake }
    }

    pub fn assert_bridge(&self, bridge: &str) -> VerifyResult<()> {
        if self.fake.has_bridge(bridge) {
            Ok(())
        } else {
            Err(VerificationError::BridgeMismatch {
                bridge: bridge.to_string(),
                expected: "present".to_string(),
            })
        }
    }

    pub fn assert_no_bridge(&self, bridge: &str) -> VerifyResult<()> {
        if self.fake.has_bridge(bridge) {
            Err(VerificationError::BridgeMismatch {
                bridge: bridge.to_string(),
                expected: "absent".to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// Verify that a port exists with the given action
    pub fn assert_port(&self, bridge: &str, port: &str, action: PortAction) -> VerifyResult<()> {
        match self.fake.port_action(bridge, port) {
            Some(actual) if actual == action => Ok(()),
            other => Err(VerificationError::PortMismatch {
                bridge: bridge.to_string(),
                port: port.to_string(),
                expected: action.to_string(),
                actual: other.map_or("absent".to_string(), |a| a.to_string()),
            }),
        }
    }

    pub fn assert_no_port(&self, bridge: &str, port: &str) -> VerifyResult<()> {
        match self.fake.port_action(bridge, port) {
            None => Ok(()),
            Some(actual) => Err(VerificationError::PortMismatch {
                bridge: bridge.to_string(),
                port: port.to_string(),
                expected: "absent".to_string(),
                actual: actual.to_string(),
            }),
        }
    }
}
