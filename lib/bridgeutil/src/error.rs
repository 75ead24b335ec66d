//! Wire- and transport-level error types shared by every socket and codec in
//! the workspace. Mirrors the teacher's `Wait`/`Fatal` split: `Wait` means
//! "nothing went wrong, there is just nothing to do right now" (the
//! non-blocking-IO equivalent of `WouldBlock`), anything else is a real
//! failure that should tear down the connection.

use std::io;
use std::net;

pub type NetworkResult<T> = Result<T, NetworkError>;

#[derive(Debug, Eq, PartialEq)]
pub enum NetworkError {
    Wait,
    Fatal(ErrorType),
}

#[derive(Debug, Eq, PartialEq)]
pub enum ErrorType {
    Expired,
    Duplicate,
    AlreadyConnected,
    PayloadTooLarge,
    EmptyPayload,
    IncorrectCategory,
    ProtocolMismatch,
    VersionMismatch,
    SequenceMismatch,
    Serialization,
    Crypto,
    AddrParse,
    Io(io::ErrorKind),
}

impl From<io::Error> for NetworkError {
    #[inline]
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::WouldBlock => NetworkError::Wait,
            kind => NetworkError::Fatal(ErrorType::Io(kind)),
        }
    }
}

impl From<net::AddrParseError> for NetworkError {
    #[inline]
    fn from(_: net::AddrParseError) -> Self {
        NetworkError::Fatal(ErrorType::AddrParse)
    }
}

pub trait ErrorUtils {
    fn has_failed(&self) -> bool;
}

impl<T> ErrorUtils for NetworkResult<T> {
    #[inline]
    fn has_failed(&self) -> bool {
        !matches!(self, Ok(_) | Err(NetworkError::Wait))
    }
}

/// Augmented `io::Write` that is aware of the amount of remaining free capacity
/// in the destination.
pub trait SizedWrite: io::Write {
    fn free_capacity(&self) -> usize;
}

/// Augmented `io::Read` that is aware of the amount of remaining data in the source.
pub trait SizedRead: io::Read {
    fn remaining_data(&self) -> usize;
}

impl SizedWrite for io::Cursor<&mut [u8]> {
    #[inline]
    fn free_capacity(&self) -> usize {
        self.get_ref().len() - self.position() as usize
    }
}

impl SizedWrite for io::Cursor<&mut Vec<u8>> {
    #[inline]
    fn free_capacity(&self) -> usize {
        usize::MAX - self.position() as usize
    }
}

impl SizedRead for io::Cursor<&[u8]> {
    #[inline]
    fn remaining_data(&self) -> usize {
        self.get_ref().len() - self.position() as usize
    }
}

impl SizedRead for io::Cursor<Vec<u8>> {
    #[inline]
    fn remaining_data(&self) -> usize {
        self.get_ref().len() - self.position() as usize
    }
}

/// Errors surfaced by the command-and-reply protocol layer (message queue,
/// handlers, peer command sender) rather than the raw transport.
#[derive(Debug)]
pub enum ProtocolError {
    /// Unknown command, missing parameter, or a value that failed to deserialize.
    Malformed(String),
    /// Illegal call/play, wrong turn, reference to an unknown player.
    RuleViolation(String),
    /// Identity not permitted to act on the referenced player or game.
    Unauthorized,
    /// A peer's reply did not match what the in-flight command expected.
    OrderingFailure,
    /// A peer's zero-knowledge proof failed to verify.
    ProofFailure,
    /// A `draw`/`reveal`/`revealall`/`shuffle` sequence did not complete in time.
    TimedOut,
    /// The backing store could not find the requested record.
    NotFound,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::Malformed(msg) => write!(f, "malformed request: {}", msg),
            ProtocolError::RuleViolation(msg) => write!(f, "rule violation: {}", msg),
            ProtocolError::Unauthorized => write!(f, "unauthorized"),
            ProtocolError::OrderingFailure => write!(f, "protocol ordering failure"),
            ProtocolError::ProofFailure => write!(f, "cryptographic proof failure"),
            ProtocolError::TimedOut => write!(f, "operation timed out"),
            ProtocolError::NotFound => write!(f, "not found"),
        }
    }
}

impl std::error::Error for ProtocolError {}
