//! Validates a connecting peer's declared public key and mints connection
//! tokens for the destination it wants to reach, compatible with
//! `messaging::channel::Channel::read_connection_token`/
//! `encode_connection_token`. Implements spec.md §4's authenticator
//! component and the public-key mechanism described in §6 "Security".

pub mod challenge;
pub mod error;
pub mod registry;
pub mod worker;

pub use challenge::{Authenticator, CHALLENGE_TIMEOUT};
pub use error::AuthError;
pub use registry::{UserRecord, UserRegistry};
