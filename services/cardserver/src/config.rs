//! On-disk configuration for one card-server process (spec.md §4.6/§5),
//! shaped after `bridge-runner`'s own `RunnerConfig`: plain
//! `Serialize`/`Deserialize` structs with a `Default` impl and a `load`
//! that panics on a malformed file.

use bridgeutil::encoding::base64;
use bridgeutil::session::server::SessionKey;
use serde_derive::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_PEER_PORT: u16 = 29108;
pub const DEFAULT_CONTROL_PORT: u16 = 29208;

/// This card server's own identity: the address its peer-proxy router
/// listens on for the other three card servers, the address its control
/// socket listens on for its own bridge node, the long-term keypair it
/// presents to its own authenticator, and its assigned position in the
/// group's total order (spec §4.6 "Peer ordering": N < E < S < W).
#[derive(Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub peer_address: String,
    pub control_address: String,
    pub session_key: SessionKey,
    #[serde(
        serialize_with = "base64::serialize",
        deserialize_with = "base64::deserialize_fixed"
    )]
    pub public_key: [u8; bridgeutil::crypto::PUBLIC_KEY_SIZE],
    #[serde(
        serialize_with = "base64::serialize",
        deserialize_with = "base64::deserialize_fixed"
    )]
    pub secret_key: [u8; bridgeutil::crypto::SECRET_KEY_SIZE],
    pub self_order: u8,
}

/// One destination this authenticator is trusted to mint tokens for (itself,
/// for loopback, included).
#[derive(Serialize, Deserialize, Clone)]
pub struct NodeSecret {
    pub node: String,
    pub key: SessionKey,
}

#[derive(Serialize, Deserialize)]
pub struct Authenticator {
    pub listen_address: String,
    pub registry_path: Option<String>,
    pub node_secrets: Vec<NodeSecret>,
}

/// Another card server in the same group, connected to eagerly at startup
/// exactly the way `bridge-runner` connects to its bridge-node peers: first
/// its authenticator for a connection token, then its peer-proxy address
/// with that token in hand.
#[derive(Serialize, Deserialize, Clone)]
pub struct Peer {
    pub name: String,
    pub address: String,
    pub authenticator_address: String,
    pub order: u8,
    /// The user id this peer's connection to our router is expected to
    /// authenticate as; `PeerProxy` rejects traffic at `order` that claims
    /// any other identity.
    pub expected_identity: String,
}

#[derive(Serialize, Deserialize)]
pub struct CardServerConfig {
    pub node: Node,
    pub authenticator: Authenticator,
    #[serde(default)]
    pub peers: Vec<Peer>,
    pub tick_poll_ms: u64,
}

impl Default for CardServerConfig {
    fn default() -> CardServerConfig {
        CardServerConfig {
            node: Node {
                name: "north-cards".to_string(),
                peer_address: format!("127.0.0.1:{}", DEFAULT_PEER_PORT),
                control_address: format!("127.0.0.1:{}", DEFAULT_CONTROL_PORT),
                session_key: SessionKey::new([0u8; SessionKey::SIZE]),
                public_key: [0u8; bridgeutil::crypto::PUBLIC_KEY_SIZE],
                secret_key: [0u8; bridgeutil::crypto::SECRET_KEY_SIZE],
                self_order: 0,
            },
            authenticator: Authenticator {
                listen_address: "127.0.0.1:29109".to_string(),
                registry_path: None,
                node_secrets: Vec::new(),
            },
            peers: Vec::new(),
            tick_poll_ms: 20,
        }
    }
}

impl CardServerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> CardServerConfig {
        serdeconv::from_toml_file(path).expect("error loading card server configuration file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = CardServerConfig::default();
        let file = tempfile::NamedTempFile::new().unwrap();
        serdeconv::to_toml_file(&config, file.path()).unwrap();
        let loaded = CardServerConfig::load(file.path());
        assert_eq!(loaded.node.name, config.node.name);
        assert_eq!(loaded.node.self_order, config.node.self_order);
        assert_eq!(loaded.node.public_key, config.node.public_key);
    }
}
