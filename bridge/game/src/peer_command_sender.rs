//! Reliable fan-out of bridge-node-to-bridge-node commands (spec §4.7).
//! Commands are strictly serialized: `send_command` enqueues, and the next
//! command is not put on the wire until every peer has acknowledged the one
//! in flight. A peer's failure reply resends the in-flight command to that
//! peer alone, on the assumption that failure reflects a transient
//! ordering skew rather than a permanent desync.

use messaging::message::Message;
use messaging::queue::STATUS_SUCCESS;
use messaging::socket::PeerSocket;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::time::Instant;

struct QueuedCommand {
    command: Vec<u8>,
    params: Vec<Vec<u8>>,
}

struct InFlight {
    message: Message,
    acked: HashSet<u8>,
}

pub struct PeerCommandSender {
    peers: BTreeMap<u8, PeerSocket>,
    queue: VecDeque<QueuedCommand>,
    in_flight: Option<InFlight>,
    next_tag: u64,
}

impl PeerCommandSender {
    pub fn new() -> PeerCommandSender {
        PeerCommandSender {
            peers: BTreeMap::new(),
            queue: VecDeque::new(),
            in_flight: None,
            next_tag: 0,
        }
    }

    /// Registers an already-connected dealer socket for `order`.
    pub fn add_peer(&mut self, order: u8, socket: PeerSocket) {
        self.peers.insert(order, socket);
    }

    /// Enqueues `command`; sent to every peer immediately if the queue was
    /// otherwise idle, else held until the in-flight command is fully
    /// acknowledged.
    pub fn send_command(&mut self, command: impl Into<Vec<u8>>, params: Vec<Vec<u8>>) {
        self.queue.push_back(QueuedCommand { command: command.into(), params });
        self.advance();
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.queue.is_empty()
    }

    /// Drives every peer socket's transport and files any replies that
    /// arrived; call on every loop iteration.
    pub fn sync(&mut self, now: Instant) {
        for socket in self.peers.values_mut() {
            let _ = socket.sync(now);
        }

        let orders: Vec<u8> = self.peers.keys().copied().collect();
        for order in orders {
            while let Some(message) = self.peers.get_mut(&order).and_then(|s| s.recv().ok().flatten()) {
                self.process_reply(order, &message);
            }
        }
    }

    /// Examines one peer's reply to the in-flight command: success advances
    /// that peer, failure resends to it alone.
    fn process_reply(&mut self, order: u8, message: &Message) {
        let success = message.frame(0) == Some(&[STATUS_SUCCESS][..]);

        let all_acked = {
            let in_flight = match &mut self.in_flight {
                Some(in_flight) => in_flight,
                None => return,
            };

            if success {
                in_flight.acked.insert(order);
                self.peers.keys().all(|o| in_flight.acked.contains(o))
            } else {
                if let Some(socket) = self.peers.get_mut(&order) {
                    socket.send(in_flight.message.clone());
                }
                false
            }
        };

        if all_acked {
            self.in_flight = None;
            self.advance();
        }
    }

    fn advance(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        let next = match self.queue.pop_front() {
            Some(next) => next,
            None => return,
        };

        let tag = self.next_tag.to_be_bytes().to_vec();
        self.next_tag += 1;

        let mut frames = vec![Vec::new(), tag, next.command];
        frames.extend(next.params);
        let message = Message::from_frames(frames);

        for socket in self.peers.values_mut() {
            socket.send(message.clone());
        }

        self.in_flight = Some(InFlight { message, acked: HashSet::new() });
    }
}

impl Default for PeerCommandSender {
    fn default() -> PeerCommandSender {
        PeerCommandSender::new()
    }
}
