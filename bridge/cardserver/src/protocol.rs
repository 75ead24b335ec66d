//! Wraps `CardServer` as a set of `MessageHandler`s for the control socket
//! (spec §4.6/§6): `init`, `shuffle`, `draw`, `reveal`, `revealall`, each a
//! synchronous request/reply pair with JSON-encoded key/value parameters,
//! the same serializer policy the bridge control protocol uses.

use crate::crypto::KeyPair;
use crate::group::PeerEntry;
use crate::server::CardServer;
use bridgeutil::error::ProtocolError;
use bridgeutil::identity::Identity;
use messaging::handler::HandlerResult;
use messaging::queue::MessageQueue;
use serde_derive::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Serialize, Deserialize)]
struct PeerEntryWire {
    order: u8,
    identity: String,
    public_key: String,
}

fn find<'a>(params: &'a [Vec<u8>], key: &str) -> Option<&'a [u8]> {
    params
        .chunks_exact(2)
        .find(|pair| pair[0] == key.as_bytes())
        .map(|pair| pair[1].as_slice())
}

fn decode_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    serde_json::from_slice(bytes).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

fn encode_json<T: serde::Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("json encoding of control protocol values never fails")
}

/// Registers the five control commands on `queue`, all sharing one
/// `CardServer` instance (the control socket allows only one outstanding
/// command at a time, so shared mutable access via `RefCell` never
/// conflicts).
pub fn register_handlers(queue: &mut MessageQueue, server: Rc<RefCell<CardServer>>) {
    let init_server = server.clone();
    queue.try_set_handler(
        "init",
        Box::new(messaging::handler::FunctionMessageHandler::new(move |identity: &Identity, params: &[Vec<u8>]| {
            handle_init(&init_server, identity, params)
        })),
    );

    let shuffle_server = server.clone();
    queue.try_set_handler(
        "shuffle",
        Box::new(messaging::handler::FunctionMessageHandler::new(move |_: &Identity, _: &[Vec<u8>]| {
            shuffle_server.borrow_mut().shuffle()?;
            Ok(Vec::new())
        })),
    );

    let draw_server = server.clone();
    queue.try_set_handler(
        "draw",
        Box::new(messaging::handler::FunctionMessageHandler::new(move |_: &Identity, params: &[Vec<u8>]| {
            let cards: Vec<u8> = decode_json(find(params, "cards").ok_or_else(|| ProtocolError::Malformed("missing cards".into()))?)?;
            let result = draw_server.borrow_mut().draw(&cards)?;
            Ok(vec![encode_json(&result.to_vec())])
        })),
    );

    let reveal_server = server.clone();
    queue.try_set_handler(
        "reveal",
        Box::new(messaging::handler::FunctionMessageHandler::new(move |_: &Identity, params: &[Vec<u8>]| {
            let cards: Vec<u8> = decode_json(find(params, "cards").ok_or_else(|| ProtocolError::Malformed("missing cards".into()))?)?;
            reveal_server.borrow_mut().reveal(&cards)?;
            Ok(Vec::new())
        })),
    );

    let revealall_server = server;
    queue.try_set_handler(
        "revealall",
        Box::new(messaging::handler::FunctionMessageHandler::new(move |_: &Identity, params: &[Vec<u8>]| {
            let cards: Vec<u8> = decode_json(find(params, "cards").ok_or_else(|| ProtocolError::Malformed("missing cards".into()))?)?;
            let result = revealall_server.borrow_mut().revealall(&cards)?;
            Ok(vec![encode_json(&result.to_vec())])
        })),
    );
}

fn handle_init(server: &Rc<RefCell<CardServer>>, _identity: &Identity, params: &[Vec<u8>]) -> HandlerResult {
    let order_bytes = find(params, "order").ok_or_else(|| ProtocolError::Malformed("missing order".into()))?;
    let order = *order_bytes.first().ok_or_else(|| ProtocolError::Malformed("empty order".into()))?;

    let peers_wire: Vec<PeerEntryWire> = decode_json(find(params, "peers").ok_or_else(|| ProtocolError::Malformed("missing peers".into()))?)?;
    let peers = peers_wire
        .into_iter()
        .map(|wire| -> Result<PeerEntry, ProtocolError> {
            let key_bytes =
                bridgeutil::encoding::base64::decode_str(&wire.public_key).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
            let mut public_key = [0u8; 32];
            if key_bytes.len() != 32 {
                return Err(ProtocolError::Malformed("public key must be 32 bytes".into()));
            }
            public_key.copy_from_slice(&key_bytes);
            Ok(PeerEntry { order: wire.order, identity: wire.identity, public_key })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let keypair = KeyPair::generate();
    server.borrow_mut().init(order, keypair, peers)?;
    Ok(Vec::new())
}
