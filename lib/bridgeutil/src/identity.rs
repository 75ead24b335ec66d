//! Peer and client identity. `UserId` is the application-assigned principal
//! (stable for the lifetime of the entity it names); `RoutingId` is the
//! transport-assigned session token (stable only for the lifetime of one
//! connection).

use crate::blob::Blob;
use crate::UserId;

/// A routing id is whatever opaque token the transport hands out to identify
/// a connection/channel. For router-style sockets this doubles as the
/// "envelope" address used to route replies back to the right connection.
pub type RoutingId = Blob;

/// The pairing of a transport session with the application principal that
/// authenticated on it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Identity {
    pub user_id: UserId,
    pub routing_id: RoutingId,
}

impl Identity {
    #[inline]
    pub fn new(user_id: UserId, routing_id: RoutingId) -> Identity {
        Identity { user_id, routing_id }
    }
}
