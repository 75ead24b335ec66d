//! Orchestrates one table behind the bridge control protocol (spec §4.9):
//! one `Engine`, the set of identities allowed to act on it, the position
//! each joined player occupies, and the out-of-band event publisher.
//! `register_handlers` wraps its operations as message handlers suitable
//! for registration under a `DispatchingMessageHandler` keyed by game UUID
//! (spec §4.8), mirroring how `bridge_cardserver::protocol` wraps
//! `CardServer`.

use bridge_core::bidding::{Bid, Call, Contract, Strain};
use bridge_core::card::{CardType, Position, POSITIONS};
use bridge_core::deal::Vulnerability;
use bridge_core::engine::{Engine, Event, EventKind, Player};
use bridge_core::hand::HandView;
use bridge_core::observer::Observer;
use bridgeutil::error::ProtocolError;
use bridgeutil::identity::Identity;
use bridgeutil::serializer::Document;
use messaging::handler::{FunctionMessageHandler, HandlerResult, MessageHandler};
use messaging::message::Message;
use messaging::queue::MessageQueue;
use messaging::socket::BoundSocket;
use serde_derive::Serialize;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::{Rc, Weak};
use uuid::Uuid;

/// Collects events the engine emits until the loop next calls
/// `BridgeGame::publish_pending`. Held by `Rc` so the engine's `Weak`
/// subscription outlives any individual borrow of the game.
struct EventSink {
    pending: Vec<Event>,
}

impl Observer<Event> for EventSink {
    fn notify(&mut self, event: &Event) {
        self.pending.push(event.clone());
    }
}

pub struct BridgeGame {
    game_uuid: Uuid,
    engine: Engine,
    event_sink: Rc<RefCell<EventSink>>,
    allowed_participants: HashSet<String>,
    peers: HashSet<String>,
    players: [Option<Uuid>; 4],
}

impl BridgeGame {
    pub fn new(game_uuid: Uuid, mut engine: Engine, allowed_participants: HashSet<String>) -> BridgeGame {
        let event_sink = Rc::new(RefCell::new(EventSink { pending: Vec::new() }));
        let weak: Weak<RefCell<dyn Observer<Event>>> = Rc::downgrade(&event_sink) as Weak<RefCell<dyn Observer<Event>>>;
        engine.subscribe(weak);

        BridgeGame {
            game_uuid,
            engine,
            event_sink,
            allowed_participants,
            peers: HashSet::new(),
            players: [None; 4],
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.game_uuid
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    fn is_authorized(&self, identity: &str) -> bool {
        self.allowed_participants.contains(identity)
    }

    fn position_of(&self, player: Uuid) -> Option<Position> {
        POSITIONS.iter().copied().find(|&p| self.players[p.order() as usize] == Some(player))
    }

    /// Accepted iff `identity` is one of the game's allowed participants and
    /// has not already been added as a peer.
    pub fn add_peer(&mut self, identity: &str) -> bool {
        self.is_authorized(identity) && self.peers.insert(identity.to_string())
    }

    /// A free seat for `player`: the one they already occupy if any,
    /// otherwise `preferred` if it is free, otherwise the lowest-ordered
    /// free seat.
    pub fn get_position_for_player_to_join(&self, preferred: Option<Position>, player: Uuid) -> Option<Position> {
        if let Some(existing) = self.position_of(player) {
            return Some(existing);
        }
        if let Some(preferred) = preferred {
            if self.players[preferred.order() as usize].is_none() {
                return Some(preferred);
            }
            return None;
        }
        POSITIONS.iter().copied().find(|&p| self.players[p.order() as usize].is_none())
    }

    pub fn join(&mut self, identity: &str, position: Position, player: Player) -> bool {
        if !self.is_authorized(identity) || player.user_id != identity {
            return false;
        }
        if self.players[position.order() as usize].is_some() {
            return false;
        }
        self.players[position.order() as usize] = Some(player.uuid);
        self.engine.set_player(position, Some(player));
        true
    }

    pub fn leave(&mut self, identity: &str, position: Position) -> bool {
        match self.engine.player_at(position) {
            Some(player) if player.user_id == identity => {
                self.players[position.order() as usize] = None;
                self.engine.set_player(position, None);
                true
            }
            _ => false,
        }
    }

    pub fn call(&mut self, identity: &str, player: &Player, call: Call) -> bool {
        player.user_id == identity && self.engine.call(player, call)
    }

    pub fn play(&mut self, identity: &str, player: &Player, hand: Position, card_index: usize) -> bool {
        player.user_id == identity && self.engine.play(player, hand, card_index)
    }

    /// Requests a new deal; fails (returns false) unless the engine is
    /// currently idle.
    pub fn request_deal(&mut self, opener: Position, vulnerability: Vulnerability) -> bool {
        self.engine.start_deal(opener, vulnerability).is_ok()
    }

    pub fn get_counter(&self) -> u64 {
        self.engine.get_counter()
    }

    /// Builds the `get` snapshot document (spec §6): `pubstate` (visible to
    /// everyone), `privstate` (`player`'s own cards, if they occupy a
    /// position), and `self` (their position and what they may currently do).
    pub fn get_state(&self, player: Option<Uuid>) -> Document {
        let position = player.and_then(|p| self.position_of(p));

        let pubstate = Document::encode(&self.pub_state()).expect("pub state always encodes");
        let privstate = Document::encode(&self.priv_state(position)).expect("priv state always encodes");
        let self_state = Document::encode(&self.self_state(position)).expect("self state always encodes");

        Document::object(vec![("pubstate", pubstate), ("privstate", privstate), ("self", self_state)])
    }

    fn pub_state(&self) -> PubState {
        let deal = self.engine.current_deal();

        let visible_cards = POSITIONS.map(|position| match deal {
            Some(deal) if deal.is_visible_to_all(position) => deal.hand(position).view(),
            _ => HandView(vec![None; 13]),
        });

        let tricks = deal
            .map(|deal| {
                deal.tricks
                    .iter()
                    .map(|trick| TrickSnapshot {
                        leader: trick.leader(),
                        plays: POSITIONS.map(|position| trick.card(position)),
                        winner: trick.winner(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        PubState {
            deal_uuid: deal.map(|d| d.uuid),
            position_in_turn: self.engine.position_in_turn(),
            declarer: deal.and_then(|d| d.bidding.declarer()),
            contract: deal.and_then(|d| d.bidding.contract()),
            calls: deal.map(|d| d.bidding.calls().to_vec()).unwrap_or_default(),
            visible_cards,
            tricks,
            vulnerability: deal.map(|d| d.vulnerability),
        }
    }

    fn priv_state(&self, position: Option<Position>) -> PrivState {
        PrivState {
            cards: position.and_then(|p| self.engine.current_deal().map(|d| d.hand(p).view())),
        }
    }

    fn self_state(&self, position: Option<Position>) -> SelfState {
        let allowed_calls = position
            .filter(|&p| self.engine.position_in_turn() == Some(p))
            .map(|_| self.allowed_calls())
            .unwrap_or_default();

        // `position_in_turn` (not `hand_in_turn`) gates this: on dummy's
        // turn declarer is the one authorized to act, so it is declarer's
        // client that must receive dummy's allowed cards, not dummy's own.
        let allowed_cards = position
            .filter(|&p| self.engine.position_in_turn() == Some(p))
            .and_then(|_| self.engine.hand_in_turn())
            .map(|hand| self.allowed_cards(hand))
            .unwrap_or_default();

        SelfState { position, allowed_calls, allowed_cards }
    }

    /// Every call legal for the position currently in turn, derived the same
    /// way `Bidding::is_legal` would decide it but from the public surface
    /// `Bidding` exposes (`lowest_allowed_bid`, `doubling_allowed`,
    /// `redoubling_allowed`): any bid at or above the lowest allowed one is
    /// legal, since a higher level always outranks every bid at a lower one
    /// and `Strain` is declared in ascending rank order.
    fn allowed_calls(&self) -> Vec<Call> {
        let deal = match self.engine.current_deal() {
            Some(deal) => deal,
            None => return Vec::new(),
        };
        let bidding = &deal.bidding;
        if bidding.has_ended() {
            return Vec::new();
        }

        let lowest = bidding.lowest_allowed_bid();
        let mut calls = vec![Call::Pass];
        for level in 1..=7u8 {
            for &strain in &[Strain::Clubs, Strain::Diamonds, Strain::Hearts, Strain::Spades, Strain::NoTrump] {
                if (level, strain) >= (lowest.level, lowest.strain) {
                    calls.push(Call::Bid(Bid::new(level, strain).expect("level is in 1..=7")));
                }
            }
        }
        if bidding.doubling_allowed() {
            calls.push(Call::Double);
        }
        if bidding.redoubling_allowed() {
            calls.push(Call::Redouble);
        }
        calls
    }

    /// Every hand index `position` may legally play right now, given the
    /// current trick's follow-suit constraint.
    fn allowed_cards(&self, position: Position) -> Vec<usize> {
        let deal = match self.engine.current_deal() {
            Some(deal) => deal,
            None => return Vec::new(),
        };
        let trick = match deal.current_trick() {
            Some(trick) => trick,
            None => return Vec::new(),
        };
        let hand = deal.hand(position);

        hand.unplayed_revealed_indices()
            .into_iter()
            .filter(|&idx| {
                let card = hand.card(idx).expect("revealed index always has a known card");
                trick.can_play(hand.is_out_of_suit(card.suit), card)
            })
            .collect()
    }

    /// Moves every event queued since the last call onto `socket`, one
    /// publish per event, using the event protocol's frame shape (spec §6):
    /// `[topic] [key] [value] ...`.
    pub fn publish_pending(&mut self, socket: &mut BoundSocket) {
        let events: Vec<Event> = self.event_sink.borrow_mut().pending.drain(..).collect();
        for event in events {
            socket.publish(self.encode_event(&event));
        }
    }

    fn encode_event(&self, event: &Event) -> Message {
        let topic = format!("{}/{}", self.game_uuid, event_kind_name(&event.kind));
        Message::from_frames(vec![
            topic.into_bytes(),
            b"deal".to_vec(),
            Document::encode(&event.deal).expect("uuid always encodes").to_bytes(),
            b"counter".to_vec(),
            Document::encode(&event.counter).expect("u64 always encodes").to_bytes(),
            b"kind".to_vec(),
            Document::encode(&event.kind).expect("event kind always encodes").to_bytes(),
        ])
    }
}

fn event_kind_name(kind: &EventKind) -> &'static str {
    match kind {
        EventKind::DealStarted { .. } => "deal-started",
        EventKind::TurnStarted { .. } => "turn-started",
        EventKind::CallMade { .. } => "call-made",
        EventKind::BiddingCompleted { .. } => "bidding-completed",
        EventKind::CardPlayed { .. } => "card-played",
        EventKind::TrickStarted { .. } => "trick-started",
        EventKind::TrickCompleted { .. } => "trick-completed",
        EventKind::DummyRevealed => "dummy-revealed",
        EventKind::DealEnded { .. } => "deal-ended",
    }
}

#[derive(Serialize)]
struct TrickSnapshot {
    leader: Position,
    plays: [Option<CardType>; 4],
    winner: Option<Position>,
}

#[derive(Serialize)]
struct PubState {
    deal_uuid: Option<Uuid>,
    position_in_turn: Option<Position>,
    declarer: Option<Position>,
    contract: Option<Contract>,
    calls: Vec<(Position, Call)>,
    visible_cards: [HandView; 4],
    tricks: Vec<TrickSnapshot>,
    vulnerability: Option<Vulnerability>,
}

#[derive(Serialize)]
struct PrivState {
    cards: Option<HandView>,
}

#[derive(Serialize)]
struct SelfState {
    position: Option<Position>,
    allowed_calls: Vec<Call>,
    allowed_cards: Vec<usize>,
}

fn malformed(what: &str) -> ProtocolError {
    ProtocolError::Malformed(format!("missing or invalid {}", what))
}

fn find_param<'a>(params: &'a [Vec<u8>], key: &str) -> Option<&'a [u8]> {
    params.chunks_exact(2).find(|pair| pair[0] == key.as_bytes()).map(|pair| pair[1].as_slice())
}

fn decode_param<T: serde::de::DeserializeOwned>(params: &[Vec<u8>], key: &str) -> Result<T, ProtocolError> {
    let bytes = find_param(params, key).ok_or_else(|| malformed(key))?;
    Document::from_bytes(bytes).and_then(|doc| doc.decode()).map_err(|_| malformed(key))
}

fn decode_optional_param<T: serde::de::DeserializeOwned>(params: &[Vec<u8>], key: &str) -> Result<Option<T>, ProtocolError> {
    match find_param(params, key) {
        Some(bytes) => Document::from_bytes(bytes).and_then(|doc| doc.decode()).map(Some).map_err(|_| malformed(key)),
        None => Ok(None),
    }
}

/// Registers the per-game handlers (`join`, `leave`, `get`, `call`, `play`,
/// `deal`) a `DispatchingMessageHandler` routes to once it has resolved a
/// request to this game (spec §4.8). `hello` and `game` are node-level
/// commands handled above any individual game and are not registered here.
pub fn register_handlers(queue: &mut MessageQueue, game: Rc<RefCell<BridgeGame>>) {
    let g = game.clone();
    queue.try_set_handler(
        "join",
        Box::new(FunctionMessageHandler::new(move |identity: &Identity, params: &[Vec<u8>]| -> HandlerResult {
            let position: Position = decode_param(params, "position")?;
            let player: Player = decode_param(params, "player")?;
            if g.borrow_mut().join(&identity.user_id, position, player) {
                Ok(Vec::new())
            } else {
                Err(ProtocolError::Unauthorized)
            }
        })),
    );

    let g = game.clone();
    queue.try_set_handler(
        "leave",
        Box::new(FunctionMessageHandler::new(move |identity: &Identity, params: &[Vec<u8>]| -> HandlerResult {
            let position: Position = decode_param(params, "position")?;
            if g.borrow_mut().leave(&identity.user_id, position) {
                Ok(Vec::new())
            } else {
                Err(ProtocolError::Unauthorized)
            }
        })),
    );

    let g = game.clone();
    queue.try_set_handler(
        "get",
        Box::new(FunctionMessageHandler::new(move |_identity: &Identity, params: &[Vec<u8>]| -> HandlerResult {
            let player: Option<Uuid> = decode_optional_param(params, "player")?;
            let state = g.borrow().get_state(player);
            Ok(vec![state.to_bytes()])
        })),
    );

    let g = game.clone();
    queue.try_set_handler(
        "call",
        Box::new(FunctionMessageHandler::new(move |identity: &Identity, params: &[Vec<u8>]| -> HandlerResult {
            let player: Player = decode_param(params, "player")?;
            let call: Call = decode_param(params, "call")?;
            if g.borrow_mut().call(&identity.user_id, &player, call) {
                Ok(Vec::new())
            } else {
                Err(ProtocolError::RuleViolation("call rejected".into()))
            }
        })),
    );

    let g = game.clone();
    queue.try_set_handler(
        "play",
        Box::new(FunctionMessageHandler::new(move |identity: &Identity, params: &[Vec<u8>]| -> HandlerResult {
            let player: Player = decode_param(params, "player")?;
            let hand: Position = decode_param(params, "hand")?;
            let index: usize = decode_param(params, "index")?;
            if g.borrow_mut().play(&identity.user_id, &player, hand, index) {
                Ok(Vec::new())
            } else {
                Err(ProtocolError::RuleViolation("play rejected".into()))
            }
        })),
    );

    queue.try_set_handler(
        "deal",
        Box::new(FunctionMessageHandler::new(move |_identity: &Identity, params: &[Vec<u8>]| -> HandlerResult {
            let opener: Position = decode_param(params, "opener")?;
            let vulnerability: Vulnerability = decode_param(params, "vulnerability")?;
            if game.borrow_mut().request_deal(opener, vulnerability) {
                Ok(Vec::new())
            } else {
                Err(ProtocolError::RuleViolation("a deal is already in progress".into()))
            }
        })),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::card_manager::{CardManager, Shuffled};
    use bridge_core::game_manager::DuplicateGameManager;
    use bridge_core::hand::Hand;

    struct FixedDeck {
        completed: bool,
        subject: bridge_core::card_manager::ShuffleSubject,
    }

    impl CardManager for FixedDeck {
        fn request_shuffle(&mut self) {
            self.completed = true;
        }
        fn is_shuffle_completed(&self) -> bool {
            self.completed
        }
        fn number_of_cards(&self) -> usize {
            52
        }
        fn hand(&self, indices: &[u8]) -> Hand {
            Hand::new(indices.try_into().expect("13 indices"))
        }
        fn subscribe(&mut self, observer: Weak<RefCell<dyn Observer<Shuffled>>>) {
            self.subject.subscribe(observer);
        }
    }

    fn new_game(allowed: &[&str]) -> BridgeGame {
        let card_manager = Rc::new(RefCell::new(FixedDeck { completed: false, subject: Default::default() }));
        let game_manager = Rc::new(RefCell::new(DuplicateGameManager::new()));
        let engine = Engine::new(card_manager, game_manager);
        BridgeGame::new(Uuid::new_v4(), engine, allowed.iter().map(|s| s.to_string()).collect())
    }

    fn player(name: &str) -> Player {
        Player { uuid: Uuid::new_v4(), user_id: name.to_string() }
    }

    #[test]
    fn add_peer_rejects_identities_outside_allowed_participants() {
        let mut game = new_game(&["alice"]);
        assert!(game.add_peer("alice"));
        assert!(!game.add_peer("bob"));
    }

    #[test]
    fn add_peer_rejects_duplicate() {
        let mut game = new_game(&["alice"]);
        assert!(game.add_peer("alice"));
        assert!(!game.add_peer("alice"));
    }

    #[test]
    fn join_binds_identity_to_position_for_the_deal() {
        let mut game = new_game(&["alice"]);
        let alice = player("alice");
        assert!(game.join("alice", Position::North, alice.clone()));
        assert_eq!(game.get_position_for_player_to_join(None, alice.uuid), Some(Position::North));
    }

    #[test]
    fn join_rejects_identity_not_matching_the_player_record() {
        let mut game = new_game(&["alice"]);
        let bob = player("bob");
        assert!(!game.join("alice", Position::North, bob));
    }

    #[test]
    fn join_rejects_an_already_occupied_seat() {
        let mut game = new_game(&["alice", "bob"]);
        assert!(game.join("alice", Position::North, player("alice")));
        assert!(!game.join("bob", Position::North, player("bob")));
    }

    #[test]
    fn get_state_reports_no_position_before_joining() {
        let game = new_game(&["alice"]);
        let alice = player("alice");
        let doc = game.get_state(Some(alice.uuid));
        let self_doc = doc.get("self").unwrap();
        assert!(self_doc.get("position").unwrap().is_null());
    }

    #[test]
    fn deal_then_call_flows_through_to_the_engine() {
        let mut game = new_game(&["n", "e", "s", "w"]);
        let north = player("n");
        for (name, position, p) in [
            ("n", Position::North, north.clone()),
            ("e", Position::East, player("e")),
            ("s", Position::South, player("s")),
            ("w", Position::West, player("w")),
        ] {
            assert!(game.join(name, position, p));
        }
        assert!(game.request_deal(Position::North, Vulnerability::NONE));
        game.engine_mut().shuffle_completed().unwrap();

        assert!(game.call("n", &north, Call::Pass));
        assert_eq!(game.engine().position_in_turn(), Some(Position::East));
    }
}
