//! Per-node bridge server binary (spec.md §5): loads configuration, runs
//! the authenticator worker on its own thread, binds the player/peer router
//! socket, and drives the message loop that creates and routes to
//! per-table games.

mod config;
mod shutdown;

use authenticator::{Authenticator, UserRegistry};
use bridge_core::card::{CardType, Position};
use bridge_core::engine::{Engine, Event, EventKind};
use bridge_core::game_manager::DuplicateGameManager;
use bridge_core::observer::Observer;
use bridge_game::bridge_game::{self, BridgeGame};
use bridge_game::cardserver_client::ControlClient;
use bridge_game::mental_card_manager::MentalCardManager;
use bridge_game::peer_command_sender::PeerCommandSender;
use bridge_game::recorder::Recorder;
use bridge_game::simple_protocol::{DealBroadcaster, SimpleCardManager};
use bridgeutil::crypto;
use bridgeutil::error::ProtocolError;
use bridgeutil::identity::Identity;
use bridgeutil::logging::{info, o, warn};
use clap::{App, Arg};
use messaging::handler::{FunctionMessageHandler, HandlerResult};
use messaging::queue::MessageQueue;
use messaging::socket::{BoundSocket, PeerSocket};
use std::cell::RefCell;
use std::collections::HashMap;
use std::net::TcpStream;
use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Per-game-command names, routed to a table's own queue by extracting the
/// `game` parameter rather than living in the table's own command space
/// (spec §4.8 — each table keeps `register_handlers`'s flat queue, and this
/// node-level loop does the dispatch-by-game-id `DispatchingMessageHandler`
/// would otherwise have done).
const TABLE_COMMANDS: &[&str] = &["join", "leave", "get", "call", "play", "deal"];

struct Table {
    game: Rc<RefCell<BridgeGame>>,
    queue: MessageQueue,
    /// Present for a simple-protocol table; lets the node-level
    /// `deal-cards` handler apply a peer's broadcast deal.
    simple_card_manager: Option<Rc<RefCell<SimpleCardManager>>>,
    /// Present for a mental-protocol table: the handle to the card server
    /// client plus the event collector driving reveal-on-play.
    mental: Option<MentalTable>,
}

struct MentalTable {
    card_manager: Rc<RefCell<MentalCardManager>>,
    pending: Rc<RefCell<Vec<EventKind>>>,
    /// Keeps the `RevealCollector` this table's engine holds only a `Weak`
    /// reference to alive for the table's lifetime.
    _collector: Rc<RefCell<RevealCollector>>,
}

/// Collects `CardPlayed`/`DummyRevealed` events so the main loop can drive
/// `MentalCardManager::reveal_played_card`/`reveal_dummy` outside of the
/// engine call that produced them — the engine itself isn't reentrant, so
/// nothing may call back into it from inside `notify`.
struct RevealCollector {
    pending: Rc<RefCell<Vec<EventKind>>>,
}

impl Observer<Event> for RevealCollector {
    fn notify(&mut self, event: &Event) {
        if matches!(event.kind, EventKind::CardPlayed { .. } | EventKind::DummyRevealed) {
            self.pending.borrow_mut().push(event.kind.clone());
        }
    }
}

/// Broadcasts a freshly generated deck to every connected peer as a
/// `deal-cards` node-level command, tagged with the table it belongs to.
struct PeerBroadcaster {
    sender: Rc<RefCell<PeerCommandSender>>,
    game_uuid: Uuid,
}

impl DealBroadcaster for PeerBroadcaster {
    fn broadcast_deal(&mut self, deck: &[CardType; 52]) {
        let deck_json = serde_json::to_vec(&deck.to_vec()).expect("deck always encodes");
        self.sender.borrow_mut().send_command(
            "deal-cards",
            vec![b"game".to_vec(), self.game_uuid.as_bytes().to_vec(), b"deck".to_vec(), deck_json],
        );
    }
}

fn node_secrets(config: &config::RunnerConfig) -> HashMap<String, [u8; crypto::KEY_SIZE]> {
    config.authenticator.node_secrets.iter().map(|entry| (entry.node.clone(), *entry.key)).collect()
}

fn connect_peer(node: &config::Node, peer: &config::Peer, log: &bridgeutil::logging::Logger) -> Option<PeerSocket> {
    let mut stream = match TcpStream::connect(&peer.authenticator_address) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(log, "could not reach peer's authenticator"; "peer" => peer.name.clone(), "reason" => err.to_string());
            return None;
        }
    };

    let mut server_key = [0u8; crypto::KEY_SIZE];
    let mut client_key = [0u8; crypto::KEY_SIZE];
    crypto::random_bytes(&mut server_key);
    crypto::random_bytes(&mut client_key);

    let (user_id, token) = match authenticator::worker::authenticate(
        &mut stream,
        node.public_key,
        &node.secret_key,
        &peer.name,
        server_key,
        client_key,
    ) {
        Ok(result) => result,
        Err(err) => {
            warn!(log, "peer authentication failed"; "peer" => peer.name.clone(), "reason" => err.to_string());
            return None;
        }
    };

    match PeerSocket::connect(
        &peer.address,
        bridgeutil::VERSION_ID,
        bridgeutil::PROTOCOL_ID,
        server_key,
        client_key,
        user_id,
        &token,
    ) {
        Ok(socket) => Some(socket),
        Err(err) => {
            warn!(log, "could not connect to peer"; "peer" => peer.name.clone(), "reason" => format!("{:?}", err));
            None
        }
    }
}

fn malformed(what: &str) -> ProtocolError {
    ProtocolError::Malformed(format!("missing or invalid {}", what))
}

/// Authenticates against the local card server exactly as `connect_peer`
/// authenticates against a bridge-node peer, then opens the blocking
/// control-socket client `MentalCardManager` drives a deal through.
fn connect_card_server(
    node: &config::Node,
    card_server: &config::CardServer,
    log: &bridgeutil::logging::Logger,
) -> Option<ControlClient> {
    let mut stream = match TcpStream::connect(&card_server.authenticator_address) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(log, "could not reach card server's authenticator"; "reason" => err.to_string());
            return None;
        }
    };

    let mut server_key = [0u8; crypto::KEY_SIZE];
    let mut client_key = [0u8; crypto::KEY_SIZE];
    crypto::random_bytes(&mut server_key);
    crypto::random_bytes(&mut client_key);

    let (user_id, token) = match authenticator::worker::authenticate(
        &mut stream,
        node.public_key,
        &node.secret_key,
        &card_server.node,
        server_key,
        client_key,
    ) {
        Ok(result) => result,
        Err(err) => {
            warn!(log, "card server authentication failed"; "reason" => err.to_string());
            return None;
        }
    };

    match PeerSocket::connect(
        &card_server.address,
        bridgeutil::VERSION_ID,
        bridgeutil::PROTOCOL_ID,
        server_key,
        client_key,
        user_id,
        &token,
    ) {
        Ok(socket) => Some(ControlClient::new(socket)),
        Err(err) => {
            warn!(log, "could not connect to card server"; "reason" => format!("{:?}", err));
            None
        }
    }
}

#[derive(serde_derive::Serialize)]
struct InitPeerWire {
    order: u8,
    identity: String,
    public_key: String,
}

/// Builds the `order`/`peers` parameters for the card server's `init`
/// command (spec §4.6: "`order` is assigned to the controlling node;
/// `peers` contains card-server peers in global order with the entry for
/// `order` omitted"). Each peer's `public_key` is a placeholder — the card
/// servers learn each other's real key during their own proof-of-possession
/// exchange and disregard what the controlling node passes here.
fn encode_init_params(card_server: &config::CardServer) -> Vec<Vec<u8>> {
    let placeholder = base64::encode([0u8; 32]);
    let peers: Vec<InitPeerWire> = card_server
        .peers
        .iter()
        .map(|peer| InitPeerWire { order: peer.order, identity: peer.identity.clone(), public_key: placeholder.clone() })
        .collect();

    vec![
        b"order".to_vec(),
        vec![card_server.order],
        b"peers".to_vec(),
        serde_json::to_vec(&peers).expect("peer list always encodes"),
    ]
}

fn find_param<'a>(params: &'a [Vec<u8>], key: &str) -> Option<&'a [u8]> {
    params.chunks_exact(2).find(|pair| pair[0] == key.as_bytes()).map(|pair| pair[1].as_slice())
}

/// Builds the node-level `MessageQueue`: `hello` (a trivial liveness check),
/// `create-table` (spins up a fresh `BridgeGame` and its own command
/// queue, wired to either the simple or the mental-card protocol depending
/// on whether a card server is configured), and `deal-cards` (applies a
/// peer's simple-protocol broadcast).
#[allow(clippy::too_many_arguments)]
fn build_node_queue(
    recorder: Rc<Recorder>,
    peer_sender: Rc<RefCell<PeerCommandSender>>,
    tables: Rc<RefCell<HashMap<Uuid, Table>>>,
    node: Rc<config::Node>,
    card_server: Option<config::CardServer>,
    log: bridgeutil::logging::Logger,
) -> MessageQueue {
    let mut queue = MessageQueue::new();

    queue.try_set_handler(
        "hello",
        Box::new(FunctionMessageHandler::new(|_identity: &Identity, _params: &[Vec<u8>]| -> HandlerResult {
            Ok(vec![b"welcome".to_vec()])
        })),
    );

    let tables_for_create = tables.clone();
    queue.try_set_handler(
        "create-table",
        Box::new(FunctionMessageHandler::new(move |_identity: &Identity, params: &[Vec<u8>]| -> HandlerResult {
            let participants_bytes = find_param(params, "participants").ok_or_else(|| malformed("participants"))?;
            let participants: Vec<String> =
                serde_json::from_slice(participants_bytes).map_err(|_| malformed("participants"))?;
            let is_leader = find_param(params, "leader").map(|b| b == b"true").unwrap_or(true);

            let game_uuid = Uuid::new_v4();
            let game_manager = Rc::new(RefCell::new(DuplicateGameManager::new()));

            let (card_manager, simple_card_manager, mental_parts) = match &card_server {
                Some(card_server) => {
                    let client = connect_card_server(&node, card_server, &log)
                        .ok_or_else(|| ProtocolError::RuleViolation("could not reach card server".into()))?;
                    let mut client = client;
                    client
                        .call("init", encode_init_params(card_server))
                        .map_err(|_| ProtocolError::RuleViolation("card server init failed".into()))?;
                    let self_position = Position::from_order(card_server.order)
                        .ok_or_else(|| malformed("card_server.order"))?;

                    let manager = Rc::new(RefCell::new(MentalCardManager::new(self_position, client)));
                    let pending = Rc::new(RefCell::new(Vec::new()));
                    let collector = Rc::new(RefCell::new(RevealCollector { pending: pending.clone() }));

                    (manager.clone() as Rc<RefCell<dyn bridge_core::card_manager::CardManager>>, None, Some((manager, pending, collector)))
                }
                None => {
                    let broadcaster = Box::new(PeerBroadcaster { sender: peer_sender.clone(), game_uuid })
                        as Box<dyn DealBroadcaster>;
                    let manager = Rc::new(RefCell::new(SimpleCardManager::new(is_leader, broadcaster)));
                    (manager.clone() as Rc<RefCell<dyn bridge_core::card_manager::CardManager>>, Some(manager), None)
                }
            };

            let mut engine = Engine::new(card_manager, game_manager);
            if let Some((_, _, collector)) = &mental_parts {
                engine.subscribe(Rc::downgrade(collector) as std::rc::Weak<RefCell<dyn Observer<Event>>>);
            }

            let game = Rc::new(RefCell::new(BridgeGame::new(
                game_uuid,
                engine,
                participants.into_iter().collect(),
            )));

            let mut table_queue = MessageQueue::new();
            bridge_game::register_handlers(&mut table_queue, game.clone());

            recorder.record_game(game_uuid, &[]).ok();

            let mental = mental_parts.map(|(card_manager, pending, collector)| MentalTable {
                card_manager,
                pending,
                _collector: collector,
            });

            tables_for_create
                .borrow_mut()
                .insert(game_uuid, Table { game, queue: table_queue, simple_card_manager, mental });

            Ok(vec![game_uuid.as_bytes().to_vec()])
        })),
    );

    queue.try_set_handler(
        "deal-cards",
        Box::new(FunctionMessageHandler::new(move |_identity: &Identity, params: &[Vec<u8>]| -> HandlerResult {
            let game_bytes = find_param(params, "game").ok_or_else(|| malformed("game"))?;
            let game_uuid = Uuid::from_slice(game_bytes).map_err(|_| malformed("game"))?;
            let deck_bytes = find_param(params, "deck").ok_or_else(|| malformed("deck"))?;
            let deck: Vec<CardType> = serde_json::from_slice(deck_bytes).map_err(|_| malformed("deck"))?;
            let deck: [CardType; 52] = deck.try_into().map_err(|_| malformed("deck"))?;

            let tables = tables.borrow();
            let table = tables.get(&game_uuid).ok_or(ProtocolError::NotFound)?;
            let manager = table.simple_card_manager.as_ref().ok_or(ProtocolError::NotFound)?;
            manager.borrow_mut().receive_deal(deck);

            Ok(Vec::new())
        })),
    );

    queue
}

/// Picks which queue a request belongs to: a table's own queue if the
/// command is one of `TABLE_COMMANDS` and names a live `game`, the
/// node-level queue otherwise.
fn table_for(tables: &HashMap<Uuid, Table>, command: &[u8], params: &[Vec<u8>]) -> Option<Uuid> {
    if !TABLE_COMMANDS.iter().any(|&c| c.as_bytes() == command) {
        return None;
    }
    let game_bytes = find_param(params, "game")?;
    let game_uuid = Uuid::from_slice(game_bytes).ok()?;
    tables.contains_key(&game_uuid).then(|| game_uuid)
}

/// Drains a mental-protocol table's collected `CardPlayed`/`DummyRevealed`
/// events and issues the matching `revealall` control command for each, per
/// spec §4.6: "When any card is played from any hand, every node sends
/// `revealall` with that single deck index. When the opening lead has been
/// played, every node additionally sends `revealall` for all 13 of the
/// dummy's indices." The revealed card types, once learned, are fed back
/// into the engine via `Engine::reveal` — the only path by which the
/// protocol's out-of-band knowledge reaches the state machine.
fn drive_mental_reveals(table: &Table, log: &bridgeutil::logging::Logger) {
    let mental = match &table.mental {
        Some(mental) => mental,
        None => return,
    };

    let events: Vec<EventKind> = mental.pending.borrow_mut().drain(..).collect();
    for event in events {
        match event {
            EventKind::CardPlayed { position, hand_index, .. } => {
                let deck_index = position.order() * 13 + hand_index as u8;
                match mental.card_manager.borrow_mut().reveal_played_card(deck_index) {
                    Ok(Some(card)) => table.game.borrow_mut().engine_mut().reveal(position, hand_index, card),
                    Ok(None) => {}
                    Err(err) => warn!(log, "card-server reveal failed"; "reason" => err.to_string()),
                }
            }
            EventKind::DummyRevealed => {
                let dummy = table
                    .game
                    .borrow()
                    .engine()
                    .current_deal()
                    .and_then(|deal| deal.bidding.declarer())
                    .map(Position::partner);
                let dummy = match dummy {
                    Some(dummy) => dummy,
                    None => continue,
                };

                match mental.card_manager.borrow_mut().reveal_dummy(dummy) {
                    Ok(()) => {
                        let manager = mental.card_manager.borrow();
                        let cards: Vec<(usize, CardType)> = (0..13usize)
                            .filter_map(|hand_index| {
                                let deck_index = dummy.order() * 13 + hand_index as u8;
                                manager.revealed_card(deck_index).map(|card| (hand_index, card))
                            })
                            .collect();
                        drop(manager);

                        let mut game = table.game.borrow_mut();
                        for (hand_index, card) in cards {
                            game.engine_mut().reveal(dummy, hand_index, card);
                        }
                    }
                    Err(err) => warn!(log, "card-server dummy reveal failed"; "reason" => err.to_string()),
                }
            }
            _ => {}
        }
    }
}

fn main() {
    let matches = App::new("Bridge Node")
        .version("1.0")
        .author("Bush Hammer Industries")
        .about("Runs one node of the distributed bridge server.")
        .arg(Arg::with_name("CONFIG").help("Path to the node's runner.toml").required(true))
        .get_matches();

    let config_path = matches.value_of("CONFIG").unwrap();
    let config = config::RunnerConfig::load(config_path);

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

    let address = config.node.address.clone().unwrap_or_else(|| format!("127.0.0.1:{}", config::DEFAULT_PORT));
    let mut router = BoundSocket::bind(&address, *config.node.session_key, bridgeutil::VERSION_ID, bridgeutil::PROTOCOL_ID)
        .unwrap_or_else(|err| panic!("failed to bind router socket: {:?}", err));

    let mut scheduler = messaging::scheduler::CallbackScheduler::new();

    let recorder = Rc::new(
        Recorder::open(&config.node.recorder_path).unwrap_or_else(|err| panic!("failed to open recorder: {}", err)),
    );

    let peer_sender = Rc::new(RefCell::new(PeerCommandSender::new()));
    for peer in &config.peers {
        if let Some(socket) = connect_peer(&config.node, peer, &node_log) {
            peer_sender.borrow_mut().add_peer(peer.order, socket);
            info!(node_log, "connected to peer"; "peer" => peer.name.clone());
        }
    }

    let tables: Rc<RefCell<HashMap<Uuid, Table>>> = Rc::new(RefCell::new(HashMap::new()));
    let card_server = config.card_server.clone();
    let mut node_queue = build_node_queue(
        recorder,
        peer_sender.clone(),
        tables.clone(),
        Rc::new(config.node),
        card_server,
        node_log.clone(),
    );

    info!(node_log, "bridge node started"; "address" => address.clone());

    let poll_interval = Duration::from_millis(config.game.tick_poll_ms.max(1));

    while !terminate.load(Ordering::SeqCst) {
        let now = Instant::now();
        router.sync(now);
        peer_sender.borrow_mut().sync(now);
        scheduler.drain();

        while let Some((identity, message)) = router.recv() {
            let frames = message.frames();
            if frames.len() < 3 {
                continue;
            }
            let command = frames[2].clone();
            let params = frames[3..].to_vec();

            let target = table_for(&tables.borrow(), &command, &params);
            let reply = match target {
                Some(game_uuid) => {
                    let mut tables_mut = tables.borrow_mut();
                    let table = tables_mut.get_mut(&game_uuid).expect("table_for only returns known tables");
                    table.queue.dispatch(&identity, &message)
                }
                None => node_queue.dispatch(&identity, &message),
            };

            router.send_to(&identity.routing_id, reply);
        }

        for table in tables.borrow().values() {
            drive_mental_reveals(table, &node_log);
            table.game.borrow_mut().publish_pending(&mut router);
        }

        std::thread::sleep(poll_interval);
    }

    info!(node_log, "shutting down");
    authenticator_handle.join().ok();
}
