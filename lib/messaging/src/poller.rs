//! Accept-side connection management: a `mio`-driven listener that accepts
//! many peers, runs them through the handshake, and keeps the live ones fed.
//! Mirrors the teacher's `neutronium::net::endpoint::Endpoint`, generalized
//! from one payload type to the `Message` frame carried by every socket kind
//! in this crate.

use crate::channel::{Channel, ChannelId, ChannelState};
use crate::frame::{ControlFrame, Frame};
use crate::message::Message;
use bridgeutil::crypto;
use bridgeutil::error::{ErrorType, ErrorUtils, NetworkError, NetworkResult};
use bridgeutil::UserId;
use indexmap::IndexSet;
use mio::net::TcpListener;
use std::io;
use std::net::SocketAddr;
use std::time;

/// Describes a change in the connectivity status of a channel.
#[derive(Debug, Clone)]
pub enum ConnectionChange {
    Connected(UserId, ChannelId),
    Disconnected(ChannelId),
}

/// Handles connection acceptance, handshaking and transmission for every
/// channel bound to a single listening address.
pub struct Endpoint {
    server: TcpListener,

    server_poll: mio::Poll,
    handshake_poll: mio::Poll,
    live_poll: mio::Poll,
    events: mio::Events,

    secret_key: [u8; crypto::KEY_SIZE],
    version: [u8; 16],
    protocol: u16,

    channels: Vec<Channel>,
    free: Vec<ChannelId>,
    live: IndexSet<ChannelId>,

    changes: Vec<ConnectionChange>,

    current_time: time::Instant,
    housekeeping_time: time::Instant,
}

impl Endpoint {
    const HANDSHAKE_TIMEOUT: time::Duration = time::Duration::from_secs(5);
    const INGRESS_TIMEOUT: time::Duration = time::Duration::from_secs(30);
    const KEEPALIVE_INTERVAL: time::Duration = time::Duration::from_secs(3);
    const HOUSEKEEPING_INTERVAL: time::Duration = time::Duration::from_secs(3);
    const ZERO_TIME: time::Duration = time::Duration::from_secs(0);
    const SERVER_POLL_TOKEN: mio::Token = mio::Token(0);

    /// Binds a listener to `address` (`<ip_or_domain>:<port>`). `secret_key`
    /// is the key shared with the authenticator so that client connection
    /// tokens addressed to this node can be opened. `version`/`protocol`
    /// guard against talking to an incompatible build.
    pub fn new(
        address: &str,
        secret_key: [u8; crypto::KEY_SIZE],
        version: [u8; 16],
        protocol: u16,
    ) -> NetworkResult<Endpoint> {
        let server_poll = mio::Poll::new()?;
        let server = TcpListener::bind(&address.parse::<SocketAddr>()?)?;

        server_poll.register(
            &server,
            Self::SERVER_POLL_TOKEN,
            mio::Ready::writable(),
            mio::PollOpt::edge(),
        )?;

        let now = time::Instant::now();

        Ok(Endpoint {
            server,
            server_poll,
            handshake_poll: mio::Poll::new()?,
            live_poll: mio::Poll::new()?,
            events: mio::Events::with_capacity(8192),
            secret_key,
            version,
            protocol,
            channels: Vec::new(),
            free: Vec::new(),
            live: IndexSet::new(),
            changes: Vec::new(),
            current_time: now,
            housekeeping_time: now,
        })
    }

    /// Queues `message` for transmission on `channel_id`.
    #[inline]
    pub fn push(&mut self, channel_id: ChannelId, message: Message) {
        self.channels[channel_id].write_payload(message);
    }

    /// Pulls the next decoded message off `channel_id`, if one has arrived.
    /// Control frames are handled internally (keepalives ignored, closure
    /// notices torn down); only payload frames are returned to the caller.
    pub fn pull(&mut self, channel_id: ChannelId) -> Option<Message> {
        loop {
            let frame = {
                let channel = &mut self.channels[channel_id];
                match channel.read() {
                    Ok(frame) => frame,
                    Err(NetworkError::Fatal(_)) => {
                        self.disconnect(channel_id, false);
                        return None;
                    }
                    Err(NetworkError::Wait) => return None,
                }
            };

            match frame {
                Frame::Control(ControlFrame::ConnectionClosed) => {
                    self.disconnect(channel_id, false);
                    return None;
                }
                Frame::Control(ControlFrame::ConnectionAccepted) => {
                    self.disconnect(channel_id, true);
                    return None;
                }
                Frame::Control(ControlFrame::Keepalive) => continue,
                Frame::Payload(cipher) => {
                    let decoded = self.channels[channel_id].decode_payload(&cipher);
                    match decoded {
                        Ok(message) => return Some(message),
                        Err(_) => {
                            self.disconnect(channel_id, true);
                            return None;
                        }
                    }
                }
            }
        }
    }

    /// Runs one iteration of the accept/handshake/live polls and flushes
    /// pending writes. Should be called on every iteration of the owning
    /// message loop.
    pub fn sync(&mut self, now: time::Instant) {
        self.current_time = now;

        if now.duration_since(self.housekeeping_time) >= Self::HOUSEKEEPING_INTERVAL {
            self.housekeeping();
            self.housekeeping_time = now;
        }

        let live_set = &mut self.live;
        let free_set = &mut self.free;
        let channels = &mut self.channels;
        let changes = &mut self.changes;

        live_set.retain(|&channel_id| {
            let channel = &mut channels[channel_id];

            let retain = if channel.has_egress() {
                !channel.send(now).has_failed()
            } else {
                true
            };

            if !retain {
                channel.close(false);
                free_set.push(channel_id);
                changes.push(ConnectionChange::Disconnected(channel_id));
            }

            retain
        });

        self.server_poll
            .poll(&mut self.events, Some(Self::ZERO_TIME))
            .expect("listen poll failed");

        let mut accepted = Vec::new();
        for event in &self.events {
            if event.readiness().is_writable() {
                loop {
                    match self.server.accept() {
                        Ok((stream, _)) => accepted.push(stream),
                        Err(err) => {
                            if err.kind() != io::ErrorKind::WouldBlock {
                                panic!("failure accepting connection {:?}", err);
                            }
                            break;
                        }
                    }
                }
            }
        }

        for stream in accepted {
            let id = match self.free.pop() {
                Some(id) => id,
                None => {
                    let id = self.channels.len();
                    self.channels.push(Channel::new(self.version, self.protocol));
                    id
                }
            };

            self.handshake_poll
                .register(
                    &stream,
                    mio::Token(id),
                    mio::Ready::readable() | mio::Ready::writable(),
                    mio::PollOpt::edge(),
                )
                .expect("stream registration failed");

            self.channels[id].open(stream, self.current_time);
        }

        self.handshake_poll
            .poll(&mut self.events, Some(Self::ZERO_TIME))
            .expect("handshake poll failed");

        let handshake_tokens: Vec<usize> = self
            .events
            .iter()
            .filter(|event| event.readiness().is_readable())
            .map(|event| event.token().0)
            .collect();

        for channel_id in handshake_tokens {
            let outcome = self.channels[channel_id].read_connection_token(&self.secret_key);
            match outcome {
                Ok(user_id) => {
                    let channel = &mut self.channels[channel_id];
                    if channel.write_control(ControlFrame::ConnectionAccepted).has_failed() {
                        panic!("failure writing connection accepted frame")
                    }
                    channel.deregister(&self.handshake_poll).expect("deregistration failed");
                    channel.register(mio::Token(channel_id), &self.live_poll).expect("registration failed");
                    self.live.insert(channel_id);
                    self.changes.push(ConnectionChange::Connected(user_id, channel_id));
                }
                Err(err) => {
                    if err != NetworkError::Wait {
                        let channel = &mut self.channels[channel_id];
                        channel.deregister(&self.handshake_poll).ok();
                        channel.close(false);
                        self.free.push(channel_id);
                        self.changes.push(ConnectionChange::Disconnected(channel_id));
                    }
                }
            }
        }

        self.live_poll
            .poll(&mut self.events, Some(Self::ZERO_TIME))
            .expect("live poll failed");

        let live_events: Vec<(usize, bool, bool)> = self
            .events
            .iter()
            .map(|event| {
                let readiness = event.readiness();
                (event.token().0, readiness.is_readable(), readiness.is_writable())
            })
            .collect();

        for (channel_id, readable, writable) in live_events {
            let channel = &mut self.channels[channel_id];

            let result = Self::ready_op(readable, || channel.receive(now))
                .and_then(|()| Self::ready_op(writable, || channel.send(now)));

            if result.is_err() {
                channel.deregister(&self.live_poll).ok();
                channel.close(true);
                self.live.remove(&channel_id);
                self.free.push(channel_id);
                self.changes.push(ConnectionChange::Disconnected(channel_id));
            }
        }
    }

    /// Drains every connectivity change accumulated since the last call.
    #[inline]
    pub fn changes(&mut self) -> impl Iterator<Item = ConnectionChange> + '_ {
        self.changes.drain(..)
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn live_channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.live.iter().copied()
    }

    #[inline]
    pub fn channel_user_id(&self, channel_id: ChannelId) -> Option<&UserId> {
        self.channels[channel_id].user_id()
    }

    fn disconnect(&mut self, channel_id: ChannelId, notify: bool) {
        self.channels[channel_id].close(notify);
        self.live.remove(&channel_id);
        self.free.push(channel_id);
        self.changes.push(ConnectionChange::Disconnected(channel_id));
    }

    #[inline]
    fn ready_op<F: FnMut() -> NetworkResult<()>>(trigger: bool, mut op: F) -> Result<(), ErrorType> {
        if trigger {
            loop {
                if let Err(err) = op() {
                    match err {
                        NetworkError::Wait => break,
                        NetworkError::Fatal(err_type) => return Err(err_type),
                    }
                }
            }
        }

        Ok(())
    }

    fn housekeeping(&mut self) {
        let now = self.current_time;
        let live_set = &mut self.live;
        let free_set = &mut self.free;
        let channels = &mut self.channels;
        let changes = &mut self.changes;

        live_set.retain(|&channel_id| {
            let channel = &mut channels[channel_id];

            let retain = match channel.state() {
                ChannelState::Handshake(timestamp) => now.duration_since(timestamp) < Self::HANDSHAKE_TIMEOUT,
                ChannelState::Connected => {
                    if channel.last_ingress_elapsed(now) >= Self::INGRESS_TIMEOUT {
                        return false;
                    }

                    if channel.last_egress_elapsed(now) >= Self::KEEPALIVE_INTERVAL
                        && channel.write_control(ControlFrame::Keepalive).has_failed()
                    {
                        panic!("fatal write error")
                    }

                    true
                }
                ChannelState::Disconnected => panic!("disconnected channel in live set"),
            };

            if !retain {
                channel.close(false);
                free_set.push(channel_id);
                changes.push(ConnectionChange::Disconnected(channel_id));
            }

            retain
        });
    }
}
