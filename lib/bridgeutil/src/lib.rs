#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

//! Shared infrastructure used by every process in the bridge server: the
//! blob/hex codec, the self-describing document format used on the wire,
//! AEAD and public-key crypto, structured logging and a few small
//! conveniences (time, the `choose!` macro).

pub const PROTOCOL_ID: u16 = 0x0b51;
pub const VERSION_ID: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
pub const CONNECTION_TOKEN_EXPIRY_SECS: u64 = 30;

/// Application-assigned principal name. Stable for the lifetime of a
/// `Player`; see `identity::Identity` for the pairing with the
/// transport-assigned routing id.
pub type UserId = String;

#[macro_export]
macro_rules! choose {
    ($cond: expr => $true_val: expr, $false_val: expr) => {{
        if $cond {
            $true_val
        } else {
            $false_val
        }
    }};
}

pub mod blob;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod identity;
pub mod logging;
pub mod serializer;
pub mod session;
pub mod time;
