//! Command handlers invoked by the message queue. Grounded in the original
//! engine's `MessageHandler`/`FunctionMessageHandler`/
//! `DispatchingMessageHandler` trio, translated from the C++ template
//! machinery into a trait object plus closures, which is how the rest of
//! this workspace wires up callbacks.

use bridgeutil::error::ProtocolError;
use bridgeutil::identity::Identity;
use std::collections::BTreeMap;

pub type HandlerResult = Result<Vec<Vec<u8>>, ProtocolError>;

/// Executes the action bound to one command name.
///
/// `params` are the raw argument frames following the command frame in the
/// request. A successful call returns the frames to append after the
/// success status in the reply; failure reports why the command could not
/// be carried out.
pub trait MessageHandler {
    fn handle(&mut self, identity: &Identity, params: &[Vec<u8>]) -> HandlerResult;
}

/// Adapts a closure into a `MessageHandler`.
pub struct FunctionMessageHandler<F> {
    function: F,
}

impl<F> FunctionMessageHandler<F>
where
    F: FnMut(&Identity, &[Vec<u8>]) -> HandlerResult,
{
    pub fn new(function: F) -> FunctionMessageHandler<F> {
        FunctionMessageHandler { function }
    }
}

impl<F> MessageHandler for FunctionMessageHandler<F>
where
    F: FnMut(&Identity, &[Vec<u8>]) -> HandlerResult,
{
    #[inline]
    fn handle(&mut self, identity: &Identity, params: &[Vec<u8>]) -> HandlerResult {
        (self.function)(identity, params)
    }
}

/// Dispatches to one of several delegate handlers by matching a key/value
/// pair in `params` against `dispatch_key`, then looking the value up in a
/// table of delegates. Used by the game runner to route a command that
/// names a game (by its deal/table identifier) to that game's own queue.
pub struct DispatchingMessageHandler {
    dispatch_key: Vec<u8>,
    delegates: BTreeMap<Vec<u8>, Box<dyn MessageHandler + Send>>,
}

impl DispatchingMessageHandler {
    pub fn new(dispatch_key: impl Into<Vec<u8>>) -> DispatchingMessageHandler {
        DispatchingMessageHandler {
            dispatch_key: dispatch_key.into(),
            delegates: BTreeMap::new(),
        }
    }

    /// Registers `delegate` for `dispatch_value`. Returns false if a
    /// delegate is already registered under that value.
    pub fn try_set_delegate(
        &mut self,
        dispatch_value: impl Into<Vec<u8>>,
        delegate: Box<dyn MessageHandler + Send>,
    ) -> bool {
        use std::collections::btree_map::Entry;

        match self.delegates.entry(dispatch_value.into()) {
            Entry::Vacant(slot) => {
                slot.insert(delegate);
                true
            }
            Entry::Occupied(_) => false,
        }
    }
}

impl MessageHandler for DispatchingMessageHandler {
    fn handle(&mut self, identity: &Identity, params: &[Vec<u8>]) -> HandlerResult {
        let mut pairs = params.chunks_exact(2);

        let value = pairs
            .find(|pair| pair[0] == self.dispatch_key)
            .map(|pair| &pair[1]);

        match value.and_then(|value| self.delegates.get_mut(value)) {
            Some(delegate) => delegate.handle(identity, params),
            None => Err(ProtocolError::Malformed("no delegate for dispatch key".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity::new("alice".to_string(), Vec::new().into())
    }

    #[test]
    fn function_handler_forwards_call() {
        let mut seen = Vec::new();
        let mut handler = FunctionMessageHandler::new(|_identity: &Identity, params: &[Vec<u8>]| {
            seen.push(params.len());
            Ok(vec![b"ok".to_vec()])
        });

        let result = handler.handle(&identity(), &[b"north".to_vec()]).unwrap();
        assert_eq!(result, vec![b"ok".to_vec()]);
    }

    #[test]
    fn dispatching_handler_routes_by_key_value_pair() {
        let mut dispatcher = DispatchingMessageHandler::new(b"game".to_vec());

        let handled = std::cell::RefCell::new(false);
        dispatcher.try_set_delegate(
            b"table-1".to_vec(),
            Box::new(FunctionMessageHandler::new(|_, _| {
                Ok(vec![b"routed".to_vec()])
            })),
        );

        let result = dispatcher
            .handle(&identity(), &[b"game".to_vec(), b"table-1".to_vec()])
            .unwrap();
        assert_eq!(result, vec![b"routed".to_vec()]);
        drop(handled);
    }

    #[test]
    fn dispatching_handler_fails_without_match() {
        let mut dispatcher = DispatchingMessageHandler::new(b"game".to_vec());
        let result = dispatcher.handle(&identity(), &[b"game".to_vec(), b"table-2".to_vec()]);
        assert!(result.is_err());
    }
}
