//! On-disk configuration for one bridge node, loaded once at startup.
//! Shaped after the teacher's `GameConfig`/`Server`/`Game` split
//! (`server/game/core/src/config.rs`): plain `Serialize`/`Deserialize`
//! structs with a `Default` impl and a `load` that panics on a malformed
//! file, since there is no sensible way to run with a broken config.

use bridgeutil::encoding::base64;
use bridgeutil::session::server::SessionKey;
use serde_derive::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_PORT: u16 = 28108;

/// This node's own identity: the address it listens on for player/peer
/// connections, the long-term keypair it presents to its own authenticator
/// (and that other nodes' authenticators validate it by), and the symmetric
/// key it shares with the authenticator worker so connection tokens
/// addressed to it can be opened.
#[derive(Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub address: Option<String>,
    pub session_key: SessionKey,
    pub max_clients: u16,
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
    pub recorder_path: String,
}

/// One destination this authenticator is trusted to mint tokens for: the
/// symmetric key it shares with that node (itself, for loopback, included).
#[derive(Serialize, Deserialize, Clone)]
pub struct NodeSecret {
    pub node: String,
    pub key: SessionKey,
}

/// The in-process authenticator worker's own settings (spec.md §5).
#[derive(Serialize, Deserialize)]
pub struct Authenticator {
    pub listen_address: String,
    pub registry_path: Option<String>,
    pub node_secrets: Vec<NodeSecret>,
}

/// An already-known bridge-node peer this node fans `PeerCommandSender`
/// commands out to. Connected to eagerly at startup: first its
/// authenticator, to obtain a connection token, then its bridge-traffic
/// address with that token in hand.
#[derive(Serialize, Deserialize, Clone)]
pub struct Peer {
    pub name: String,
    pub address: String,
    pub authenticator_address: String,
    /// This peer's table position order, as passed to
    /// `PeerCommandSender::add_peer`.
    pub order: u8,
}

/// A configured local card-server control socket, used when a table is
/// created with the mental-card protocol. Authenticated against exactly
/// like a peer, since the card server speaks the same connection-token
/// handshake as any other node.
#[derive(Serialize, Deserialize, Clone)]
pub struct CardServer {
    pub address: String,
    pub authenticator_address: String,
    pub node: String,
    /// This node's position in the card-exchange group's total order
    /// (spec §4.6 "Peer ordering": N < E < S < W), passed to the local
    /// card server's `init` as `order` and used directly as this table's
    /// own position in the mental-card protocol (one node plays one seat).
    pub order: u8,
    /// The other three card servers in the group, in the form `init`
    /// expects.
    pub peers: Vec<CardServerPeer>,
}

/// One other card server in the group, as named to the local card
/// server's `init` command: its order and the identity its connection to
/// ours will present (the same role `Peer::expected_identity` plays for
/// `card-server`'s own peer-proxy configuration).
#[derive(Serialize, Deserialize, Clone)]
pub struct CardServerPeer {
    pub order: u8,
    pub identity: String,
}

#[derive(Serialize, Deserialize)]
pub struct Game {
    pub tick_poll_ms: u64,
}

#[derive(Serialize, Deserialize)]
pub struct RunnerConfig {
    pub node: Node,
    pub authenticator: Authenticator,
    #[serde(default)]
    pub peers: Vec<Peer>,
    pub card_server: Option<CardServer>,
    pub game: Game,
}

impl Default for RunnerConfig {
    fn default() -> RunnerConfig {
        RunnerConfig {
            node: Node {
                name: "north".to_string(),
                address: Some(format!("127.0.0.1:{}", DEFAULT_PORT)),
                session_key: SessionKey::new([0u8; SessionKey::SIZE]),
                max_clients: 64,
                public_key: [0u8; bridgeutil::crypto::PUBLIC_KEY_SIZE],
                secret_key: [0u8; bridgeutil::crypto::SECRET_KEY_SIZE],
                recorder_path: "north.sled".to_string(),
            },
            authenticator: Authenticator {
                listen_address: "127.0.0.1:28109".to_string(),
                registry_path: None,
                node_secrets: Vec::new(),
            },
            peers: Vec::new(),
            card_server: None,
            game: Game { tick_poll_ms: 20 },
        }
    }
}

impl RunnerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> RunnerConfig {
        serdeconv::from_toml_file(path).expect("error loading runner configuration file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = RunnerConfig::default();
        let file = tempfile::NamedTempFile::new().unwrap();
        serdeconv::to_toml_file(&config, file.path()).unwrap();
        let loaded = RunnerConfig::load(file.path());
        assert_eq!(loaded.node.name, config.node.name);
        assert_eq!(loaded.node.public_key, config.node.public_key);
    }
}
