//! Per-node card-server process binary (spec.md §4.6/§5): a peer of the
//! other three card servers in its group over the peer-proxy socket, and
//! the control-socket server its own bridge node drives through `init`,
//! `shuffle`, `draw`, `reveal`, `revealall`. A separate OS process entirely
//! from `bridge-runner`, per spec.md §5's scheduling model.

mod config;
mod shutdown;

use authenticator::{Authenticator, UserRegistry};
use bridge_cardserver::protocol;
use bridge_cardserver::proxy::PeerProxy;
use bridge_cardserver::server::CardServer;
use bridgeutil::crypto;
use bridgeutil::logging::{info, o, warn};
use clap::{App, Arg};
use messaging::queue::MessageQueue;
use messaging::socket::BoundSocket;
use std::cell::RefCell;
use std::collections::HashMap;
use std::net::TcpStream;
use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

fn node_secrets(config: &config::CardServerConfig) -> HashMap<String, [u8; crypto::KEY_SIZE]> {
    config.authenticator.node_secrets.iter().map(|entry| (entry.node.clone(), *entry.key)).collect()
}

/// Authenticates against `peer`'s authenticator and returns the pieces
/// `PeerProxy::add_peer` needs to open the outgoing connection itself.
fn authenticate_peer(
    node: &config::Node,
    peer: &config::Peer,
    log: &bridgeutil::logging::Logger,
) -> Option<(String, [u8; crypto::KEY_SIZE], [u8; crypto::KEY_SIZE], Vec<u8>)> {
    let mut stream = match TcpStream::connect(&peer.authenticator_address) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(log, "could not reach card-server peer's authenticator"; "peer" => peer.name.clone(), "reason" => err.to_string());
            return None;
        }
    };

    let mut server_key = [0u8; crypto::KEY_SIZE];
    let mut client_key = [0u8; crypto::KEY_SIZE];
    crypto::random_bytes(&mut server_key);
    crypto::random_bytes(&mut client_key);

    match authenticator::worker::authenticate(
        &mut stream,
        node.public_key,
        &node.secret_key,
        &peer.name,
        server_key,
        client_key,
    ) {
        Ok((user_id, token)) => Some((user_id, server_key, client_key, token)),
        Err(err) => {
            warn!(log, "card-server peer authentication failed"; "peer" => peer.name.clone(), "reason" => err.to_string());
            None
        }
    }
}

fn main() {
    let matches = App::new("Card Server")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Runs one node's mental-card protocol peer.")
        .arg(Arg::with_name("CONFIG").help("Path to the card server's cardserver.toml").required(true))
        .get_matches();

    let config_path = matches.value_of("CONFIG").unwrap();
    let config = config::CardServerConfig::load(config_path);

    let log = bridgeutil::logging::init::<&str>(None);
    let node_log = log.new(o!("node" => config.node.name.clone()));

    let terminate = shutdown::install();

    let registry = config
        .authenticator
        .registry_path
        .as_ref()
        .and_then(|path| UserRegistry::load(path).ok())
        .unwrap_or_else(UserRegistry::new);

    let authenticator =
        Authenticator::new(node_secrets(&config), registry, node_log.new(o!("component" => "authenticator")));
    let listener = std::net::TcpListener::bind(&config.authenticator.listen_address)
        .unwrap_or_else(|err| panic!("failed to bind authenticator socket: {}", err));

    let authenticator_terminate = terminate.clone();
    let authenticator_handle = std::thread::Builder::new()
        .name("authenticator".to_string())
        .spawn(move || authenticator::worker::run(authenticator, listener, authenticator_terminate))
        .expect("failed to spawn authenticator thread");

    let mut proxy = PeerProxy::bind(
        config.node.self_order,
        &config.node.peer_address,
        *config.node.session_key,
        bridgeutil::VERSION_ID,
        bridgeutil::PROTOCOL_ID,
    )
    .unwrap_or_else(|err| panic!("failed to bind peer-proxy socket: {:?}", err));

    for peer in &config.peers {
        if let Some((user_id, server_key, client_key, token)) = authenticate_peer(&config.node, peer, &node_log) {
            match proxy.add_peer(
                peer.order,
                &peer.address,
                bridgeutil::VERSION_ID,
                bridgeutil::PROTOCOL_ID,
                server_key,
                client_key,
                user_id,
                &token,
                peer.expected_identity.clone(),
            ) {
                Ok(()) => info!(node_log, "connected to card-server peer"; "peer" => peer.name.clone()),
                Err(err) => warn!(node_log, "could not connect to card-server peer"; "peer" => peer.name.clone(), "reason" => format!("{:?}", err)),
            }
        }
    }

    let mut control = BoundSocket::bind(
        &config.node.control_address,
        *config.node.session_key,
        bridgeutil::VERSION_ID,
        bridgeutil::PROTOCOL_ID,
    )
    .unwrap_or_else(|err| panic!("failed to bind control socket: {:?}", err));

    let server = Rc::new(RefCell::new(CardServer::new(proxy)));
    let mut queue = MessageQueue::new();
    protocol::register_handlers(&mut queue, server);

    info!(
        node_log, "card server started";
        "peer_address" => config.node.peer_address.clone(),
        "control_address" => config.node.control_address.clone()
    );

    let poll_interval = Duration::from_millis(config.tick_poll_ms.max(1));

    while !terminate.load(Ordering::SeqCst) {
        let now = Instant::now();
        control.sync(now);

        while let Some((identity, message)) = control.recv() {
            let reply = queue.dispatch(&identity, &message);
            control.send_to(&identity.routing_id, reply);
        }

        std::thread::sleep(poll_interval);
    }

    info!(node_log, "shutting down");
    authenticator_handle.join().ok();
}
