//! Dispatches inbound command messages to registered handlers and builds
//! replies, per the bridge control protocol: a request is
//! `[empty] [tag] [command] [key] [value] ...`; the reply is
//! `[status] [tag] [command] [frame]*` where `status` is a single byte,
//! non-negative for success and negative for failure. Grounded in the
//! original engine's `MessageQueue`, with the `[command]` frame echoed back
//! (the original only echoes `[tag]`) so a client juggling several
//! concurrently in-flight commands of different names can still tell replies
//! apart without also having to invent unique tags.

use crate::handler::MessageHandler;
use crate::message::Message;
use bridgeutil::identity::Identity;
use std::collections::BTreeMap;

pub const STATUS_SUCCESS: u8 = 0;
pub const STATUS_FAILURE: u8 = 255;

/// Maps command names to the handler responsible for them.
pub struct MessageQueue {
    handlers: BTreeMap<Vec<u8>, Box<dyn MessageHandler + Send>>,
}

impl MessageQueue {
    pub fn new() -> MessageQueue {
        MessageQueue {
            handlers: BTreeMap::new(),
        }
    }

    /// Registers `handler` for `command`. Returns false (and leaves the
    /// existing registration untouched) if a different handler is already
    /// registered for that command name.
    pub fn try_set_handler(
        &mut self,
        command: impl Into<Vec<u8>>,
        handler: Box<dyn MessageHandler + Send>,
    ) -> bool {
        use std::collections::btree_map::Entry;

        match self.handlers.entry(command.into()) {
            Entry::Vacant(slot) => {
                slot.insert(handler);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Dispatches one request message (as received, sans any socket-level
    /// routing frame) and returns the reply to send back on the same
    /// channel.
    pub fn dispatch(&mut self, identity: &Identity, request: &Message) -> Message {
        let frames = request.frames();

        if frames.len() < 3 {
            return Self::failure_reply(Vec::new(), Vec::new(), Vec::new());
        }

        let tag = frames[1].clone();
        let command = frames[2].clone();
        let params = &frames[3..];

        match self.handlers.get_mut(&command) {
            Some(handler) => match handler.handle(identity, params) {
                Ok(output) => Self::reply(STATUS_SUCCESS, tag, command, output),
                Err(_) => Self::failure_reply(tag, command, Vec::new()),
            },
            None => Self::failure_reply(tag, command, Vec::new()),
        }
    }

    fn failure_reply(tag: Vec<u8>, command: Vec<u8>, output: Vec<Vec<u8>>) -> Message {
        Self::reply(STATUS_FAILURE, tag, command, output)
    }

    fn reply(status: u8, tag: Vec<u8>, command: Vec<u8>, output: Vec<Vec<u8>>) -> Message {
        let mut frames = Vec::with_capacity(3 + output.len());
        frames.push(vec![status]);
        frames.push(tag);
        frames.push(command);
        frames.extend(output);
        Message::from_frames(frames)
    }
}

impl Default for MessageQueue {
    fn default() -> MessageQueue {
        MessageQueue::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::FunctionMessageHandler;
    use bridgeutil::error::ProtocolError;

    fn identity() -> Identity {
        Identity::new("north-node".to_string(), Vec::new().into())
    }

    fn request(tag: &str, command: &str, params: &[&str]) -> Message {
        let mut frames = vec![Vec::new(), tag.as_bytes().to_vec(), command.as_bytes().to_vec()];
        frames.extend(params.iter().map(|p| p.as_bytes().to_vec()));
        Message::from_frames(frames)
    }

    #[test]
    fn dispatches_registered_command() {
        let mut queue = MessageQueue::new();
        queue.try_set_handler(
            "call",
            Box::new(FunctionMessageHandler::new(|_, _| Ok(vec![b"accepted".to_vec()]))),
        );

        let reply = queue.dispatch(&identity(), &request("t1", "call", &["player", "north"]));
        let frames = reply.frames();
        assert_eq!(frames[0], vec![STATUS_SUCCESS]);
        assert_eq!(frames[1], b"t1");
        assert_eq!(frames[2], b"call");
        assert_eq!(frames[3], b"accepted");
    }

    #[test]
    fn unknown_command_replies_failure() {
        let mut queue = MessageQueue::new();
        let reply = queue.dispatch(&identity(), &request("t1", "nonsense", &[]));
        assert_eq!(reply.frames()[0], vec![STATUS_FAILURE]);
    }

    #[test]
    fn handler_error_replies_failure() {
        let mut queue = MessageQueue::new();
        queue.try_set_handler(
            "call",
            Box::new(FunctionMessageHandler::new(|_, _| {
                Err(ProtocolError::RuleViolation("not your turn".into()))
            })),
        );

        let reply = queue.dispatch(&identity(), &request("t1", "call", &[]));
        assert_eq!(reply.frames()[0], vec![STATUS_FAILURE]);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut queue = MessageQueue::new();
        assert!(queue.try_set_handler("call", Box::new(FunctionMessageHandler::new(|_, _| Ok(vec![])))));
        assert!(!queue.try_set_handler("call", Box::new(FunctionMessageHandler::new(|_, _| Ok(vec![])))));
    }
}
