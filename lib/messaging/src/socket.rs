//! Router/Dealer/Pub/Sub/Pair socket semantics layered over `Channel` (one
//! outgoing connection) and `Endpoint` (many incoming connections). There is
//! no ZeroMQ in this workspace's dependency stack, so these are reimplemented
//! directly on the `mio`-polled, AEAD-encrypted transport in `channel.rs`/
//! `poller.rs` — the same request/reply and pub/sub vocabulary, the same
//! bind-vs-connect split, carried over plain TCP instead of `zmq.hpp`.

use crate::channel::{Channel, ChannelId};
use crate::message::Message;
use crate::poller::{ConnectionChange, Endpoint};
use bridgeutil::blob::Blob;
use bridgeutil::crypto;
use bridgeutil::error::{ErrorUtils, NetworkError, NetworkResult};
use bridgeutil::identity::{Identity, RoutingId};
use bridgeutil::UserId;
use byteorder::{BigEndian, WriteBytesExt};
use mio::net::TcpStream;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

#[inline]
fn routing_id_for(channel_id: ChannelId) -> RoutingId {
    let mut bytes = Vec::with_capacity(8);
    bytes.write_u64::<BigEndian>(channel_id as u64).expect("write to Vec never fails");
    Blob::from(bytes)
}

#[inline]
fn channel_id_from(routing_id: &RoutingId) -> Option<ChannelId> {
    use byteorder::ReadBytesExt;
    let mut cursor = std::io::Cursor::new(&routing_id[..]);
    cursor.read_u64::<BigEndian>().ok().map(|v| v as usize)
}

/// A bound, many-peer socket: Router (request/reply with identity-prefixed
/// envelopes) or Pub (broadcast, ignores incoming data).
pub struct BoundSocket {
    endpoint: Endpoint,
    identities: HashMap<ChannelId, UserId>,
}

impl BoundSocket {
    pub fn bind(
        address: &str,
        secret_key: [u8; crypto::KEY_SIZE],
        version: [u8; 16],
        protocol: u16,
    ) -> NetworkResult<BoundSocket> {
        Ok(BoundSocket {
            endpoint: Endpoint::new(address, secret_key, version, protocol)?,
            identities: HashMap::new(),
        })
    }

    /// Drives the connection-accept/handshake/live cycle; must be called on
    /// every loop iteration before `recv`/`send`.
    pub fn sync(&mut self, now: Instant) {
        self.endpoint.sync(now);

        for change in self.endpoint.changes().collect::<Vec<_>>() {
            match change {
                ConnectionChange::Connected(user_id, channel_id) => {
                    self.identities.insert(channel_id, user_id);
                }
                ConnectionChange::Disconnected(channel_id) => {
                    self.identities.remove(&channel_id);
                }
            }
        }
    }

    /// Router-style receive: returns the sender's identity alongside the
    /// message. Call until it returns `None`.
    pub fn recv(&mut self) -> Option<(Identity, Message)> {
        let live: Vec<ChannelId> = self.endpoint.live_channels().collect();

        for channel_id in live {
            if let Some(message) = self.endpoint.pull(channel_id) {
                let user_id = self.identities.get(&channel_id).cloned().unwrap_or_default();
                let identity = Identity::new(user_id, routing_id_for(channel_id));
                return Some((identity, message));
            }
        }

        None
    }

    /// Router-style send: routes `message` to the channel named by
    /// `routing_id` (as handed out by `recv`).
    pub fn send_to(&mut self, routing_id: &RoutingId, message: Message) {
        if let Some(channel_id) = channel_id_from(routing_id) {
            self.endpoint.push(channel_id, message);
        }
    }

    /// Pub-style send: broadcasts `message` to every connected peer.
    pub fn publish(&mut self, message: Message) {
        for channel_id in self.endpoint.live_channels().collect::<Vec<_>>() {
            self.endpoint.push(channel_id, message.clone());
        }
    }

    #[inline]
    pub fn connected_peers(&self) -> impl Iterator<Item = &UserId> {
        self.identities.values()
    }
}

/// A single outgoing connection: Dealer (request/reply, no envelope), Sub
/// (receive-only, topic-filtered), or Pair (exclusive point-to-point, used
/// for the card-server control socket).
pub struct PeerSocket {
    channel: Channel,
    subscriptions: Vec<Vec<u8>>,
}

impl PeerSocket {
    /// Connects to `address`, presenting `connection_token` (built with
    /// `Channel::encode_connection_token`) as the handshake payload.
    pub fn connect(
        address: &str,
        version: [u8; 16],
        protocol: u16,
        server_key: [u8; crypto::KEY_SIZE],
        client_key: [u8; crypto::KEY_SIZE],
        user_id: UserId,
        connection_token: &[u8],
    ) -> NetworkResult<PeerSocket> {
        let addr: SocketAddr = address.parse()?;
        let stream = TcpStream::connect(&addr)?;

        let mut channel = Channel::new(version, protocol);
        channel.open_as_client(stream, Instant::now(), server_key, client_key, user_id);

        let mut socket = PeerSocket {
            channel,
            subscriptions: Vec::new(),
        };

        socket.channel.write_handshake(connection_token)?;
        Ok(socket)
    }

    /// Registers this socket's stream on `poll`.
    pub fn register(&self, token: mio::Token, poll: &mio::Poll) -> std::io::Result<()> {
        self.channel.register(token, poll)
    }

    pub fn deregister(&self, poll: &mio::Poll) -> std::io::Result<()> {
        self.channel.deregister(poll)
    }

    /// Runs one receive/send cycle; must be called after the registered
    /// token reports readiness.
    pub fn sync(&mut self, now: Instant) -> NetworkResult<()> {
        loop {
            match self.channel.receive(now) {
                Ok(()) => break,
                Err(NetworkError::Wait) => break,
                Err(err) => return Err(err),
            }
        }

        if self.channel.has_egress() {
            self.channel.send(now)?;
        }

        Ok(())
    }

    /// Subscribes to messages whose first frame starts with `topic`. An
    /// empty subscription list (the default) accepts every topic.
    pub fn subscribe(&mut self, topic: impl Into<Vec<u8>>) {
        self.subscriptions.push(topic.into());
    }

    fn accepts(&self, message: &Message) -> bool {
        if self.subscriptions.is_empty() {
            return true;
        }

        match message.frame(0) {
            Some(topic) => self.subscriptions.iter().any(|prefix| topic.starts_with(prefix.as_slice())),
            None => false,
        }
    }

    /// Pulls the next message, applying topic filtering for Sub-style use.
    /// Call in a loop until it returns `None`.
    pub fn recv(&mut self) -> NetworkResult<Option<Message>> {
        loop {
            match self.channel.read() {
                Ok(crate::frame::Frame::Payload(cipher)) => {
                    let message = self.channel.decode_payload(&cipher)?;
                    if self.accepts(&message) {
                        return Ok(Some(message));
                    }
                }
                Ok(crate::frame::Frame::Control(_)) => continue,
                Err(NetworkError::Wait) => return Ok(None),
                Err(err) => return Err(err),
            }
        }
    }

    /// Queues `message` for transmission.
    pub fn send(&mut self, message: Message) {
        self.channel.write_payload(message);
    }

    #[inline]
    pub fn has_failed_send(&mut self, now: Instant) -> bool {
        self.channel.send(now).has_failed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_id_round_trips_through_channel_id() {
        let routing_id = routing_id_for(42);
        assert_eq!(channel_id_from(&routing_id), Some(42));
    }
}
