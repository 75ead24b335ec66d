//! Authenticator-specific failures, convertible into the workspace's shared
//! protocol error so a handler built on top of this crate can report them
//! through the usual failure-reply path.

use bridgeutil::error::ProtocolError;
use std::fmt;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum AuthError {
    /// No pending challenge for that id, or it already expired.
    NoSuchChallenge,
    /// The response nonce did not match what was sealed to the claimed key.
    ChallengeFailed,
    /// No shared secret is configured for the named destination node.
    UnknownNode(String),
    /// A malformed request: wrong frame count, non-UTF8 node name, or a key
    /// of the wrong length.
    Malformed(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::NoSuchChallenge => write!(f, "no such challenge, or it has expired"),
            AuthError::ChallengeFailed => {
                write!(f, "challenge response did not prove possession of the claimed key")
            }
            AuthError::UnknownNode(node) => write!(f, "no shared secret configured for node `{}`", node),
            AuthError::Malformed(reason) => write!(f, "malformed authenticator request: {}", reason),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<AuthError> for ProtocolError {
    fn from(err: AuthError) -> ProtocolError {
        match err {
            AuthError::NoSuchChallenge | AuthError::ChallengeFailed => ProtocolError::Unauthorized,
            AuthError::UnknownNode(_) => ProtocolError::RuleViolation(err.to_string()),
            AuthError::Malformed(reason) => ProtocolError::Malformed(reason),
        }
    }
}
