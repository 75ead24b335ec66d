//! Card-server specific failure modes, layered under `bridgeutil::error`'s
//! transport-level `NetworkError`/`ProtocolError` the same way `EngineError`
//! sits under them on the bridge-game side.

use std::fmt;

#[derive(Debug, Eq, PartialEq)]
pub enum ProofError {
    /// A peer's zero-knowledge proof did not verify.
    VerificationFailed { peer_order: u8 },
    /// `order` in a peer list or command did not match a known peer.
    UnknownPeer { order: u8 },
    /// A control command arrived before `init` completed, or a second
    /// `init` was attempted after one already succeeded.
    NotInitialized,
    AlreadyInitialized,
    /// A requested card index was outside the 52-card deck.
    IndexOutOfRange { index: u8 },
}

impl fmt::Display for ProofError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProofError::VerificationFailed { peer_order } => {
                write!(f, "proof from peer {} failed to verify", peer_order)
            }
            ProofError::UnknownPeer { order } => write!(f, "no peer registered at order {}", order),
            ProofError::NotInitialized => write!(f, "card server group has not been initialized"),
            ProofError::AlreadyInitialized => write!(f, "card server group is already initialized"),
            ProofError::IndexOutOfRange { index } => write!(f, "deck index {} out of range", index),
        }
    }
}

impl std::error::Error for ProofError {}

impl From<ProofError> for bridgeutil::error::ProtocolError {
    fn from(err: ProofError) -> bridgeutil::error::ProtocolError {
        match err {
            ProofError::VerificationFailed { .. } => bridgeutil::error::ProtocolError::ProofFailure,
            ProofError::UnknownPeer { .. } | ProofError::IndexOutOfRange { .. } => {
                bridgeutil::error::ProtocolError::Malformed(err.to_string())
            }
            ProofError::NotInitialized | ProofError::AlreadyInitialized => {
                bridgeutil::error::ProtocolError::OrderingFailure
            }
        }
    }
}
