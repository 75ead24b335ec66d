//! Turns one router socket (receiving from every peer card-server) and N
//! dealer sockets (one outgoing connection per peer) into N in-process
//! byte streams that look like point-to-point pair-sockets to the
//! cryptographic layer above. Wire format per spec §4.6/§6: three frames,
//! an empty routing frame, a one-byte sender order, then the payload.

use bridgeutil::crypto as sodium;
use bridgeutil::error::NetworkResult;
use bridgeutil::identity::Identity;
use messaging::message::Message;
use messaging::socket::{BoundSocket, PeerSocket};
use std::collections::{HashMap, VecDeque};
use std::time::Instant;

pub struct PeerProxy {
    self_order: u8,
    router: BoundSocket,
    dealers: HashMap<u8, PeerSocket>,
    expected_identity: HashMap<u8, String>,
    inbox: HashMap<u8, VecDeque<Vec<u8>>>,
}

impl PeerProxy {
    pub fn bind(
        self_order: u8,
        address: &str,
        secret_key: [u8; sodium::KEY_SIZE],
        version: [u8; 16],
        protocol: u16,
    ) -> NetworkResult<PeerProxy> {
        Ok(PeerProxy {
            self_order,
            router: BoundSocket::bind(address, secret_key, version, protocol)?,
            dealers: HashMap::new(),
            expected_identity: HashMap::new(),
            inbox: HashMap::new(),
        })
    }

    /// Opens the outgoing connection to the peer at `order`, and records
    /// the identity its incoming traffic must present.
    #[allow(clippy::too_many_arguments)]
    pub fn add_peer(
        &mut self,
        order: u8,
        address: &str,
        version: [u8; 16],
        protocol: u16,
        server_key: [u8; sodium::KEY_SIZE],
        client_key: [u8; sodium::KEY_SIZE],
        self_identity: String,
        connection_token: &[u8],
        expected_identity: String,
    ) -> NetworkResult<()> {
        let dealer = PeerSocket::connect(address, version, protocol, server_key, client_key, self_identity, connection_token)?;
        self.dealers.insert(order, dealer);
        self.expected_identity.insert(order, expected_identity);
        self.inbox.insert(order, VecDeque::new());
        Ok(())
    }

    /// Drives the router and every dealer's accept/handshake/live cycle.
    pub fn sync(&mut self, now: Instant) {
        self.router.sync(now);
        for dealer in self.dealers.values_mut() {
            let _ = dealer.sync(now);
        }
        self.drain_router();
    }

    /// Pulls every message currently buffered on the router socket,
    /// validates the sender-order frame and the sender's identity, and
    /// files the payload into that peer's inbox.
    fn drain_router(&mut self) {
        while let Some((identity, message)) = self.router.recv() {
            self.accept(&identity, &message);
        }
    }

    fn accept(&mut self, identity: &Identity, message: &Message) {
        let frames = message.frames();
        if frames.len() != 3 || !frames[0].is_empty() {
            return;
        }
        let order = match frames[1].first() {
            Some(&b) => b,
            None => return,
        };
        if order == self.self_order {
            return;
        }
        match self.expected_identity.get(&order) {
            Some(expected) if expected.as_str() == identity.user_id => {}
            _ => return,
        }

        self.inbox.entry(order).or_default().push_back(frames[2].clone());
    }

    /// Pops the next buffered payload received from `order`, if any.
    pub fn recv_from(&mut self, order: u8) -> Option<Vec<u8>> {
        self.inbox.get_mut(&order)?.pop_front()
    }

    /// Sends `payload` to the peer at `order`, prefixed with self's order
    /// byte per the wire format.
    pub fn send_to(&mut self, order: u8, payload: Vec<u8>) {
        if let Some(dealer) = self.dealers.get_mut(&order) {
            let message = Message::from_frames(vec![Vec::new(), vec![self.self_order], payload]);
            dealer.send(message);
        }
    }

    pub fn broadcast(&mut self, payload: Vec<u8>) {
        let orders: Vec<u8> = self.dealers.keys().copied().collect();
        for order in orders {
            self.send_to(order, payload.clone());
        }
    }
}
