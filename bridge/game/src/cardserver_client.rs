//! The bridge-side half of the card-server control socket (spec §4.6): a
//! blocking request/reply client matching the framing `messaging::queue`
//! expects on the other end. Only one command is ever outstanding at a
//! time, so this can simply poll its socket to completion before
//! returning, same as the card server's own peer-proxy commands do.

use bridgeutil::error::{NetworkError, ProtocolError};
use messaging::message::Message;
use messaging::queue::STATUS_SUCCESS;
use messaging::socket::PeerSocket;
use std::time::{Duration, Instant};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ControlClient {
    socket: PeerSocket,
    next_tag: u64,
    timeout: Duration,
}

impl ControlClient {
    pub fn new(socket: PeerSocket) -> ControlClient {
        ControlClient { socket, next_tag: 0, timeout: DEFAULT_TIMEOUT }
    }

    /// Sends `command` with `params` (alternating key/value frames) and
    /// blocks until the matching reply arrives or the wall-clock timeout
    /// expires.
    pub fn call(&mut self, command: &str, params: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, ProtocolError> {
        let tag = self.next_tag.to_be_bytes().to_vec();
        self.next_tag += 1;

        let mut frames = vec![Vec::new(), tag.clone(), command.as_bytes().to_vec()];
        frames.extend(params);
        self.socket.send(Message::from_frames(frames));

        let deadline = Instant::now() + self.timeout;
        loop {
            let _ = self.socket.sync(Instant::now());
            match self.socket.recv() {
                Ok(Some(message)) => {
                    let reply = message.frames();
                    if reply.len() < 3 || reply[1] != tag {
                        continue;
                    }
                    if reply[0] == [STATUS_SUCCESS] {
                        return Ok(reply[3..].to_vec());
                    }
                    return Err(ProtocolError::RuleViolation(format!("card server rejected {}", command)));
                }
                Ok(None) => {}
                Err(NetworkError::Wait) => {}
                Err(_) => return Err(ProtocolError::OrderingFailure),
            }
            if Instant::now() >= deadline {
                return Err(ProtocolError::TimedOut);
            }
        }
    }
}
