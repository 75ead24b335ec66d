//! A single encrypted, framed TCP connection. Mirrors the teacher's
//! `neutronium::net::channel::Channel`, generalized from one fixed payload
//! type to an arbitrary multi-frame `Message`.
//!
//! Every frame on the wire is AEAD-encrypted under a key derived at
//! handshake time (the server/client key pair carried inside the client's
//! connection token), with the frame sequence number as the nonce, so a
//! replayed or reordered frame fails to decrypt.

use crate::buffer::Buffer;
use crate::frame::{Category, ControlFrame, Frame};
use crate::message::Message;
use bridgeutil::crypto;
use bridgeutil::error::{ErrorType, NetworkError, NetworkResult};
use bridgeutil::session::user::PrivateData;
use bridgeutil::UserId;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use mio::net::TcpStream;
use std::io::{self, Cursor};
use std::net::Shutdown;
use std::time::Instant;

const READ_BUF_SIZE: usize = 65536;
const WRITE_BUF_SIZE: usize = 65536;
const HEADER_SIZE: usize = 5; // 1 category byte + 4 length bytes

pub type ChannelId = usize;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ChannelState {
    Handshake(Instant),
    Connected,
    Disconnected,
}

/// A single peer connection: TCP stream plus read/write buffers, handshake
/// state and the symmetric keys negotiated for this connection.
pub struct Channel {
    stream: Option<TcpStream>,
    state: ChannelState,

    version: [u8; 16],
    protocol: u16,

    user_id: Option<UserId>,

    read_sequence: u64,
    write_sequence: u64,

    last_egress: Instant,
    last_ingress: Instant,

    server_key: [u8; crypto::KEY_SIZE],
    client_key: [u8; crypto::KEY_SIZE],

    read_buffer: Buffer,
    write_buffer: Buffer,

    outgoing: Vec<Message>,
}

impl Channel {
    pub fn new(version: [u8; 16], protocol: u16) -> Channel {
        let now = Instant::now();

        Channel {
            stream: None,
            state: ChannelState::Disconnected,
            version,
            protocol,
            user_id: None,
            read_sequence: 0,
            write_sequence: 0,
            last_egress: now,
            last_ingress: now,
            server_key: [0u8; crypto::KEY_SIZE],
            client_key: [0u8; crypto::KEY_SIZE],
            read_buffer: Buffer::new(READ_BUF_SIZE),
            write_buffer: Buffer::new(WRITE_BUF_SIZE),
            outgoing: Vec::new(),
        }
    }

    /// Opens the channel over a freshly-accepted or freshly-connected stream.
    pub fn open(&mut self, stream: TcpStream, now: Instant) {
        stream.set_nodelay(true).ok();
        self.stream = Some(stream);
        self.state = ChannelState::Handshake(now);
        self.read_sequence = 0;
        self.write_sequence = 0;
        self.last_egress = now;
        self.last_ingress = now;
        self.read_buffer.clear();
        self.write_buffer.clear();
        self.outgoing.clear();
    }

    /// Opens the channel with already-known keys and skips the inbound
    /// handshake — used on the dealer (initiating) side of a connection,
    /// where the server/client keys were already handed out by the
    /// authenticator along with the peer endpoint.
    pub fn open_as_client(
        &mut self,
        stream: TcpStream,
        now: Instant,
        server_key: [u8; crypto::KEY_SIZE],
        client_key: [u8; crypto::KEY_SIZE],
        user_id: UserId,
    ) {
        self.open(stream, now);
        self.server_key = server_key;
        self.client_key = client_key;
        self.user_id = Some(user_id);
        self.state = ChannelState::Connected;
    }

    /// Closes the channel. When `notify` is set, a best-effort
    /// `ConnectionClosed` control frame is flushed first so the peer learns
    /// the disconnection was deliberate rather than a timeout or crash.
    pub fn close(&mut self, notify: bool) {
        if notify && self.state == ChannelState::Connected {
            if self.write_control(ControlFrame::ConnectionClosed).is_ok() {
                self.send(Instant::now()).ok();
            }
        }

        if let Some(stream) = self.stream.take() {
            stream.shutdown(Shutdown::Both).ok();
        }
        self.state = ChannelState::Disconnected;
    }

    /// Registers the channel's stream on `poll` under `token`.
    pub fn register(&self, token: mio::Token, poll: &mio::Poll) -> io::Result<()> {
        let stream = self.stream.as_ref().expect("channel must be open to register");
        poll.register(
            stream,
            token,
            mio::Ready::readable() | mio::Ready::writable(),
            mio::PollOpt::edge(),
        )
    }

    /// Deregisters the channel's stream from `poll`.
    pub fn deregister(&self, poll: &mio::Poll) -> io::Result<()> {
        let stream = self.stream.as_ref().expect("channel must be open to deregister");
        poll.deregister(stream)
    }

    /// True if there is anything queued to flush to the socket.
    #[inline]
    pub fn has_egress(&self) -> bool {
        !self.outgoing.is_empty() || !self.write_buffer.is_empty()
    }

    #[inline]
    pub fn state(&self) -> ChannelState {
        self.state
    }

    #[inline]
    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    #[inline]
    pub fn stream(&self) -> Option<&TcpStream> {
        self.stream.as_ref()
    }

    #[inline]
    pub fn last_ingress_elapsed(&self, now: Instant) -> std::time::Duration {
        now.duration_since(self.last_ingress)
    }

    #[inline]
    pub fn last_egress_elapsed(&self, now: Instant) -> std::time::Duration {
        now.duration_since(self.last_egress)
    }

    /// Consumes the handshake message sent by a freshly-accepted client: a
    /// connection token encrypted under `secret_key`. On success the channel
    /// transitions to `Connected` and the resolved user id is returned.
    pub fn read_connection_token(&mut self, secret_key: &[u8; crypto::KEY_SIZE]) -> NetworkResult<UserId> {
        self.fill_read_buffer()?;

        let available = self.read_buffer.read_slice();
        if available.len() < HEADER_SIZE {
            return Err(NetworkError::Wait);
        }

        let mut header = Cursor::new(&available[..HEADER_SIZE]);
        let category = Category::from_byte(header.read_u8()?)?;
        let length = header.read_u32::<BigEndian>()? as usize;

        if category != Category::Payload {
            return Err(NetworkError::Fatal(ErrorType::ProtocolMismatch));
        }

        if available.len() < HEADER_SIZE + length {
            return Err(NetworkError::Wait);
        }

        let cipher = &available[HEADER_SIZE..HEADER_SIZE + length];

        if cipher.len() <= crypto::MAC_SIZE {
            return Err(NetworkError::Fatal(ErrorType::EmptyPayload));
        }

        let plain_len = cipher.len() - crypto::MAC_SIZE;
        let mut plain = vec![0u8; plain_len];

        let aed = PrivateData::additional_data(&self.version[..], self.protocol, 0)
            .map_err(|_| NetworkError::Fatal(ErrorType::Crypto))?;

        if !crypto::decrypt(&mut plain, cipher, &aed, 0, secret_key) {
            return Err(NetworkError::Fatal(ErrorType::Crypto));
        }

        let private_data =
            PrivateData::read(&plain[..]).map_err(|_| NetworkError::Fatal(ErrorType::Serialization))?;

        self.server_key = private_data.server_key;
        self.client_key = private_data.client_key;
        self.user_id = Some(private_data.user_id.clone());
        self.state = ChannelState::Connected;
        self.read_buffer.move_head(HEADER_SIZE + length);

        Ok(private_data.user_id)
    }

    /// Builds the handshake payload a client sends right after connecting:
    /// the connection token, encrypted under the authenticator's shared
    /// secret key, addressed at the node whose public endpoint it dialed.
    pub fn encode_connection_token(
        secret_key: &[u8; crypto::KEY_SIZE],
        version: [u8; 16],
        protocol: u16,
        user_id: &str,
        server_key: [u8; crypto::KEY_SIZE],
        client_key: [u8; crypto::KEY_SIZE],
    ) -> NetworkResult<Vec<u8>> {
        let private_data = PrivateData {
            user_id: user_id.to_string(),
            server_key,
            client_key,
        };

        let mut plain = Vec::with_capacity(PrivateData::encoded_size(user_id));
        private_data
            .write(&mut plain)
            .map_err(|_| NetworkError::Fatal(ErrorType::Serialization))?;

        let mut cipher = vec![0u8; plain.len() + crypto::MAC_SIZE];
        let aed = PrivateData::additional_data(&version[..], protocol, 0)
            .map_err(|_| NetworkError::Fatal(ErrorType::Crypto))?;

        if !crypto::encrypt(&mut cipher, &plain, &aed, 0, secret_key) {
            return Err(NetworkError::Fatal(ErrorType::Crypto));
        }

        let mut framed = Vec::with_capacity(HEADER_SIZE + cipher.len());
        framed.push(Category::Payload.into());
        framed.write_u32::<BigEndian>(cipher.len() as u32)?;
        framed.extend_from_slice(&cipher);

        Ok(framed)
    }

    /// Queues a message for transmission; flushed by `send`.
    pub fn write_payload(&mut self, message: Message) {
        self.outgoing.push(message);
    }

    /// Queues already-framed bytes for transmission ahead of any queued
    /// `Message`s — used once, right after connecting, to deliver the
    /// connection token produced by `encode_connection_token`.
    pub fn write_handshake(&mut self, framed: &[u8]) -> NetworkResult<()> {
        self.write_raw(framed)
    }

    pub fn write_control(&mut self, control: ControlFrame) -> NetworkResult<()> {
        let mut framed = Vec::with_capacity(HEADER_SIZE);
        framed.push(control.category().into());
        framed.write_u32::<BigEndian>(0)?;
        self.write_raw(&framed)
    }

    fn write_raw(&mut self, bytes: &[u8]) -> NetworkResult<()> {
        if bytes.len() > self.write_buffer.free_capacity() {
            return Err(NetworkError::Wait);
        }
        self.write_buffer.write_slice()[..bytes.len()].copy_from_slice(bytes);
        self.write_buffer.move_tail(bytes.len());
        Ok(())
    }

    /// Encrypts and enqueues every outgoing message into the write buffer,
    /// then attempts to flush to the socket.
    pub fn send(&mut self, now: Instant) -> NetworkResult<()> {
        while let Some(message) = self.outgoing.first() {
            let plain = message.encode()?;
            let mut cipher = vec![0u8; plain.len() + crypto::MAC_SIZE];

            let aed = self.version.to_vec();
            if !crypto::encrypt(&mut cipher, &plain, &aed, self.write_sequence, &self.client_key) {
                return Err(NetworkError::Fatal(ErrorType::Crypto));
            }

            let mut framed = Vec::with_capacity(HEADER_SIZE + cipher.len());
            framed.push(Category::Payload.into());
            framed.write_u32::<BigEndian>(cipher.len() as u32)?;
            framed.extend_from_slice(&cipher);

            if self.write_raw(&framed).is_err() {
                break;
            }

            self.write_sequence += 1;
            self.outgoing.remove(0);
        }

        if let Some(stream) = &mut self.stream {
            let written = self.write_buffer.egress(stream)?;
            if written > 0 {
                self.last_egress = now;
            }
        }

        Ok(())
    }

    fn fill_read_buffer(&mut self) -> NetworkResult<()> {
        let stream = self.stream.as_mut().ok_or(NetworkError::Wait)?;
        match self.read_buffer.ingress(stream) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Reads and decrypts the next complete frame, if any.
    pub fn receive(&mut self, now: Instant) -> NetworkResult<()> {
        self.fill_read_buffer()?;
        if !self.read_buffer.is_empty() {
            self.last_ingress = now;
        }
        Ok(())
    }

    /// Parses one frame out of the read buffer (post `receive`). Call in a
    /// loop until it returns `NetworkError::Wait`.
    pub fn read(&mut self) -> NetworkResult<Frame> {
        let available = self.read_buffer.read_slice();
        if available.len() < HEADER_SIZE {
            return Err(NetworkError::Wait);
        }

        let category = Category::from_byte(available[0])?;
        let length = (&available[1..HEADER_SIZE]).read_u32::<BigEndian>()? as usize;

        if available.len() < HEADER_SIZE + length {
            return Err(NetworkError::Wait);
        }

        let payload_range = &available[HEADER_SIZE..HEADER_SIZE + length];
        let frame = Frame::from_parts(category, payload_range.to_vec());
        self.read_buffer.move_head(HEADER_SIZE + length);

        Ok(frame)
    }

    /// Decrypts a payload frame body read via `read` into a `Message`.
    pub fn decode_payload(&mut self, cipher: &[u8]) -> NetworkResult<Message> {
        if cipher.len() <= crypto::MAC_SIZE {
            return Err(NetworkError::Fatal(ErrorType::EmptyPayload));
        }

        let plain_len = cipher.len() - crypto::MAC_SIZE;
        let mut plain = vec![0u8; plain_len];
        let aed = self.version.to_vec();

        if !crypto::decrypt(&mut plain, cipher, &aed, self.read_sequence, &self.server_key) {
            return Err(NetworkError::Fatal(ErrorType::Crypto));
        }

        self.read_sequence += 1;
        Message::decode(&plain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_token_round_trips() {
        let secret_key = [9u8; crypto::KEY_SIZE];
        let server_key = [1u8; crypto::KEY_SIZE];
        let client_key = [2u8; crypto::KEY_SIZE];
        let version = [0u8; 16];

        let framed =
            Channel::encode_connection_token(&secret_key, version, 1, "north-node", server_key, client_key)
                .unwrap();

        let mut channel = Channel::new(version, 1);
        channel.read_buffer.write_slice()[..framed.len()].copy_from_slice(&framed);
        channel.read_buffer.move_tail(framed.len());
        channel.state = ChannelState::Handshake(Instant::now());

        let user_id = channel.read_connection_token(&secret_key).unwrap();
        assert_eq!(user_id, "north-node");
        assert_eq!(channel.state(), ChannelState::Connected);
        assert_eq!(channel.server_key, server_key);
        assert_eq!(channel.client_key, client_key);
    }
}
