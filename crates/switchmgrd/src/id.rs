//! Compound identifiers for ports.
//!
//! Ports are tracked as `"<bridge>:<port>"`. Bridges are tracked by name.

use ovs_cfgmgr_common::{defaults::ID_SEPARATOR, CfgMgrError, CfgMgrResult};

/// Joins a bridge and port name into a port identifier.
///
/// Neither name may contain `:`; config validation rejects such names before
/// they reach this point.
pub fn encode(bridge: &str, port: &str) -> String {
    format!("{}{}{}", bridge, ID_SEPARATOR, port)
}

/// Splits a port identifier into `(bridge, port)`.
pub fn decode(id: &str) -> CfgMgrResult<(String, String)> {
    let mut parts = id.split(ID_SEPARATOR);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(bridge), Some(port), None) if !bridge.is_empty() && !port.is_empty() => {
            Ok((bridge.to_string(), port.to_string()))
        }
        _ => Err(CfgMgrError::malformed_identifier(id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        assert_eq!(encode("br0", "eth0"), "br0:eth0");
    }

    #[test]
    fn test_decode() {
        let (bridge, port) = decode("br0:eth0").unwrap();
        assert_eq!(bridge, "br0");
        assert_eq!(port, "eth0");
    }

    #[test]
    fn test_decode_inverts_encode() {
        for (bridge, port) in [("br0", "eth0"), ("br-int", "tap_1"), ("a", "b.100")] {
            assert_eq!(
                decode(&encode(bridge, port)).unwrap(),
                (bridge.to_string(), port.to_string())
            );
        }
    }

    #[test]
    fn test_decode_malformed() {
        for id in ["", "br0", "br0:eth0:x", ":eth0", "br0:", ":", "::"] {
            match decode(id) {
                Err(CfgMgrError::MalformedIdentifier { id: got }) => assert_eq!(got, id),
                other => panic!("expected MalformedIdentifier for {:?}, got {:?}", id, other),
            }
        }
    }
}
