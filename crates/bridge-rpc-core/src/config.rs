//! Centralized configuration for bridge-rpc.
//!
//! Constants live on [`RpcConfig`]; per-peer settings live on [`PeerOptions`].

use std::time::Duration;

/// Protocol-level configuration.
pub struct RpcConfig;

impl RpcConfig {
    /// Literal emitted in every message. Never validated on input.
    pub const JSONRPC_VERSION: &'static str = "2.0";

    /// Timeout used by `invoke` and the CLI when none is given.
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(3000);

    /// Upper bound on a single length-prefixed frame.
    pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16MB

    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum concurrent connections accepted by a listening bridge.
    pub const MAX_CONNECTIONS: usize = 32;

    /// Label used in log lines when none is configured.
    pub const DEFAULT_LABEL: &'static str = "peer";
}

/// Which side of the bridge this peer is.
///
/// The host executes registered methods itself; the remote side forwards
/// them over the transport. Detecting the side is left to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    Host,
    #[default]
    Remote,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::Remote => "remote",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "host" => Some(Role::Host),
            "remote" => Some(Role::Remote),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Runtime options for a single [`crate::RpcPeer`].
#[derive(Debug, Clone)]
pub struct PeerOptions {
    /// Timeout applied by [`crate::RpcPeer::invoke`].
    pub default_timeout: Duration,
    pub role: Role,
    /// Name of this side in log output.
    pub label: String,
    /// Answer responses that match no pending call with an `InvalidRequest`
    /// diagnostic. The reply carries the other side's id, so only enable this
    /// on a side that never issues calls of its own.
    pub reply_to_unmatched: bool,
}

impl Default for PeerOptions {
    fn default() -> Self {
        Self {
            default_timeout: RpcConfig::DEFAULT_CALL_TIMEOUT,
            role: Role::default(),
            label: RpcConfig::DEFAULT_LABEL.to_string(),
            reply_to_unmatched: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip() {
        for role in [Role::Host, Role::Remote] {
            let parsed = Role::from_str(role.as_str()).expect("Should parse");
            assert_eq!(role, parsed);
        }
        assert_eq!(Role::from_str("HOST"), Some(Role::Host));
        assert_eq!(Role::from_str("ui"), None);
    }

    #[test]
    fn test_defaults_are_reasonable() {
        let options = PeerOptions::default();
        assert_eq!(options.default_timeout, Duration::from_millis(3000));
        assert_eq!(options.role, Role::Remote);
        assert!(!options.reply_to_unmatched);
        assert!(RpcConfig::MAX_FRAME_SIZE > 1024);
    }
}
