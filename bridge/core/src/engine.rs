//! The state machine that drives one table through shuffling, bidding, and
//! play: `Idle` → `ShufflingRequested` → `Bidding` → `Playing` → back to
//! `Idle`. Everything the engine does is observable as an `Event`; callers
//! never poll for state changes, they subscribe.

use crate::bidding::{Call, Contract};
use crate::card::{CardType, Position};
use crate::card_manager::CardManager;
use crate::deal::{Deal, Phase, Vulnerability};
use crate::function_queue::FunctionQueue;
use crate::game_manager::{DuplicateResult, GameManager};
use crate::hand::OutOfSuit;
use crate::observer::Subject;
use crate::trick::Trick;
use serde_derive::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use uuid::Uuid;

/// A seat's authorized occupant: a stable player identity bound to whichever
/// user is allowed to act for it. Binding a player UUID to a user for life
/// is enforced one level up (the bridge game), not here — the engine only
/// cares whether the player presented matches the one on file for a seat.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub uuid: Uuid,
    pub user_id: String,
}

/// One item of the engine's event stream. Carries the deal it occurred in
/// and a counter monotonically increasing across the engine's lifetime, so
/// consumers can order a snapshot fetched out-of-band against the stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub deal: Uuid,
    pub counter: u64,
    pub kind: EventKind,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum EventKind {
    DealStarted { opener: Position, vulnerability: Vulnerability },
    TurnStarted { position: Position },
    CallMade { position: Position, call: Call, index: usize },
    BiddingCompleted { declarer: Position, contract: Contract },
    CardPlayed { position: Position, card: CardType, hand_index: usize, trick_index: usize },
    TrickStarted { leader: Position },
    TrickCompleted { winner: Position, index: usize },
    DummyRevealed,
    DealEnded { tricks_won: (u8, u8), result: DuplicateResult },
}

#[derive(Debug, Eq, PartialEq)]
pub enum EngineError {
    WrongPhase,
    NotShuffled,
    RecallRejected,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            EngineError::WrongPhase => "engine is not in the phase this operation requires",
            EngineError::NotShuffled => "card manager has not completed a shuffle yet",
            EngineError::RecallRejected => "persisted deal replayed to an illegal state",
        };
        write!(f, "{}", message)
    }
}

impl std::error::Error for EngineError {}

enum State {
    Idle,
    ShufflingRequested { deal_uuid: Uuid, opener: Position, vulnerability: Vulnerability },
    Active(Deal),
}

/// Drives one table. Owns no transport or persistence; `card_manager` and
/// `game_manager` are shared with whatever else needs them (the card
/// protocol holds the same `card_manager` handle, per the ownership note in
/// spec §3).
pub struct Engine {
    card_manager: Rc<RefCell<dyn CardManager>>,
    game_manager: Rc<RefCell<dyn GameManager>>,
    players: [Option<Player>; 4],
    state: State,
    counter: u64,
    observers: Subject<Event>,
    queue: FunctionQueue,
}

impl Engine {
    pub fn new(card_manager: Rc<RefCell<dyn CardManager>>, game_manager: Rc<RefCell<dyn GameManager>>) -> Engine {
        Engine {
            card_manager,
            game_manager,
            players: [None, None, None, None],
            state: State::Idle,
            counter: 0,
            observers: Subject::new(),
            queue: FunctionQueue::new(),
        }
    }

    pub fn subscribe(&mut self, observer: std::rc::Weak<RefCell<dyn crate::observer::Observer<Event>>>) {
        self.observers.subscribe(observer);
    }

    #[inline]
    pub fn get_counter(&self) -> u64 {
        self.counter
    }

    pub fn set_player(&mut self, position: Position, player: Option<Player>) {
        self.players[position.order() as usize] = player;
    }

    pub fn player_at(&self, position: Position) -> Option<&Player> {
        self.players[position.order() as usize].as_ref()
    }

    pub fn current_deal(&self) -> Option<&Deal> {
        match &self.state {
            State::Active(deal) => Some(deal),
            _ => None,
        }
    }

    /// The position whose *occupant* must act next: during bidding, the raw
    /// auction rotation; during play, the raw trick rotation, except that on
    /// dummy's turn it is the declarer who must act (declarer plays both
    /// their own and dummy's cards — dummy never acts). Use `hand_in_turn`
    /// for which hand's cards are actually being played.
    pub fn position_in_turn(&self) -> Option<Position> {
        match &self.state {
            State::Active(deal) => match deal.phase {
                Phase::Bidding => deal.bidding.position_in_turn(),
                Phase::Playing => {
                    let raw = deal.current_trick().and_then(Trick::position_in_turn)?;
                    if deal.dummy() == Some(raw) {
                        deal.bidding.declarer()
                    } else {
                        Some(raw)
                    }
                }
                Phase::Ended => None,
            },
            _ => None,
        }
    }

    /// During play, the hand that must supply the next card: the raw trick
    /// rotation seat, unsubstituted — this may be dummy, whose cards the
    /// declarer plays (see `position_in_turn` for who is authorized to act).
    pub fn hand_in_turn(&self) -> Option<Position> {
        let deal = self.current_deal()?;
        if deal.phase != Phase::Playing {
            return None;
        }
        deal.current_trick().and_then(Trick::position_in_turn)
    }

    pub fn is_visible_to_all(&self, position: Position) -> bool {
        self.current_deal().map_or(false, |deal| deal.is_visible_to_all(position))
    }

    /// Injects a card reveal learned out-of-band — the mental-card
    /// protocol's `draw`/`reveal`/`revealall` control commands resolve
    /// asynchronously to the engine's own state transitions, so the card
    /// protocol proxy calls this directly once it learns a card's type
    /// rather than going through `call`/`play`. No-op without an active
    /// deal or if the slot was already revealed.
    pub fn reveal(&mut self, position: Position, hand_index: usize, card: CardType) {
        if let State::Active(deal) = &mut self.state {
            let hand = deal.hand_mut(position);
            if hand.request_reveal(&[hand_index]) {
                hand.complete_reveal(&[hand_index], &[card]);
            }
        }
    }

    /// Requests a new deal. Moves Idle → ShufflingRequested and asks the
    /// card manager to shuffle; the transition into Bidding happens once
    /// `shuffle_completed` is called (the card manager's completion may be
    /// asynchronous, so this does not happen inline).
    pub fn start_deal(&mut self, opener: Position, vulnerability: Vulnerability) -> Result<Uuid, EngineError> {
        if !matches!(self.state, State::Idle) {
            return Err(EngineError::WrongPhase);
        }
        let deal_uuid = Uuid::new_v4();
        self.state = State::ShufflingRequested { deal_uuid, opener, vulnerability };
        self.card_manager.borrow_mut().request_shuffle();
        Ok(deal_uuid)
    }

    /// Called by the owner once it has determined, outside of any borrow of
    /// the card manager's own refcell, that the requested shuffle has
    /// completed. Builds the deal's four hands and transitions to Bidding.
    pub fn shuffle_completed(&mut self) -> Result<(), EngineError> {
        let (deal_uuid, opener, vulnerability) = match self.state {
            State::ShufflingRequested { deal_uuid, opener, vulnerability } => (deal_uuid, opener, vulnerability),
            _ => return Err(EngineError::WrongPhase),
        };

        let manager = self.card_manager.borrow();
        if !manager.is_shuffle_completed() {
            return Err(EngineError::NotShuffled);
        }

        let mut hands = Vec::with_capacity(4);
        for &position in &crate::card::POSITIONS {
            let indices: Vec<u8> = position.deck_indices().collect();
            hands.push(manager.hand(&indices));
        }
        drop(manager);
        let hands: [crate::hand::Hand; 4] = hands.try_into().unwrap_or_else(|_| unreachable!());

        let deal = Deal::new(deal_uuid, opener, vulnerability, hands);
        self.state = State::Active(deal);

        self.emit(deal_uuid, EventKind::DealStarted { opener, vulnerability });
        self.emit(deal_uuid, EventKind::TurnStarted { position: opener });
        Ok(())
    }

    /// Applies `call` as `player`'s call for the position currently in
    /// turn. Returns false (no side effect) if it is not that player's
    /// position, the engine isn't bidding, or the call itself is illegal.
    pub fn call(&mut self, player: &Player, call: Call) -> bool {
        let deal_uuid = match self.current_deal() {
            Some(deal) if deal.phase == Phase::Bidding => deal.uuid,
            _ => return false,
        };

        let position = match self.position_in_turn() {
            Some(p) => p,
            None => return false,
        };
        if self.player_at(position) != Some(player) {
            return false;
        }

        let deal = match &mut self.state {
            State::Active(deal) => deal,
            _ => return false,
        };
        if !deal.bidding.call(position, call) {
            return false;
        }
        let index = deal.bidding.number_of_calls() - 1;

        self.emit(deal_uuid, EventKind::CallMade { position, call, index });

        let ended = {
            let deal = match &self.state {
                State::Active(deal) => deal,
                _ => unreachable!(),
            };
            deal.bidding.has_ended()
        };
        if !ended {
            let next_turn = self.position_in_turn();
            if let Some(next_turn) = next_turn {
                self.emit(deal_uuid, EventKind::TurnStarted { position: next_turn });
            }
            return true;
        }

        let contract = {
            let deal = match &self.state {
                State::Active(deal) => deal,
                _ => unreachable!(),
            };
            deal.bidding.contract()
        };

        match contract {
            None => {
                let result = self.game_manager.borrow_mut().add_passed_out();
                self.finish_deal(deal_uuid, (0, 0), result);
            }
            Some(contract) => {
                let declarer = {
                    let deal = match &self.state {
                        State::Active(deal) => deal,
                        _ => unreachable!(),
                    };
                    deal.bidding.declarer().expect("a contract implies a declarer")
                };

                let trump = match contract.bid.strain {
                    crate::bidding::Strain::NoTrump => None,
                    crate::bidding::Strain::Clubs => Some(crate::card::Suit::Clubs),
                    crate::bidding::Strain::Diamonds => Some(crate::card::Suit::Diamonds),
                    crate::bidding::Strain::Hearts => Some(crate::card::Suit::Hearts),
                    crate::bidding::Strain::Spades => Some(crate::card::Suit::Spades),
                };

                let opening_leader = declarer.next();
                {
                    let deal = match &mut self.state {
                        State::Active(deal) => deal,
                        _ => unreachable!(),
                    };
                    deal.phase = Phase::Playing;
                    deal.tricks.push(Trick::new(opening_leader, trump));
                }

                self.emit(deal_uuid, EventKind::BiddingCompleted { declarer, contract });
                self.emit(deal_uuid, EventKind::TurnStarted { position: opening_leader });
                self.emit(deal_uuid, EventKind::TrickStarted { leader: opening_leader });
            }
        }

        true
    }

    /// Plays `card_index` from `hand`'s slot for `player`. `hand` must be the
    /// raw trick rotation's seat (`hand_in_turn`) — this may be dummy, whose
    /// cards the declarer plays. `player` must therefore match the occupant
    /// of `position_in_turn` (declarer on dummy's turn), not of `hand`
    /// itself.
    pub fn play(&mut self, player: &Player, hand: Position, card_index: usize) -> bool {
        let deal_uuid = match self.current_deal() {
            Some(deal) if deal.phase == Phase::Playing => deal.uuid,
            _ => return false,
        };

        let raw_turn = match self.current_deal().and_then(|d| d.current_trick()).and_then(Trick::position_in_turn) {
            Some(p) => p,
            None => return false,
        };
        if hand != raw_turn {
            return false;
        }
        let acting = match self.position_in_turn() {
            Some(p) => p,
            None => return false,
        };
        if self.player_at(acting) != Some(player) {
            return false;
        }

        let accepted = {
            let deal = match &mut self.state {
                State::Active(deal) => deal,
                _ => return false,
            };
            if deal.hand(hand).is_played(card_index) {
                false
            } else {
                match deal.hand(hand).card(card_index) {
                    None => false,
                    Some(card) => {
                        let out_of_suit = deal.hand(hand).is_out_of_suit(card.suit);
                        let trick = deal.current_trick().expect("playing phase always has an open trick");
                        if !trick.can_play(out_of_suit, card) {
                            false
                        } else {
                            let trick = deal.current_trick_mut().unwrap();
                            if trick.play(raw_turn, card) {
                                deal.hand_mut(hand).mark_played(card_index);
                                true
                            } else {
                                false
                            }
                        }
                    }
                }
            }
        };
        if !accepted {
            return false;
        }

        let (card, trick_index) = {
            let deal = match &self.state {
                State::Active(deal) => deal,
                _ => unreachable!(),
            };
            let trick = deal.current_trick().unwrap();
            (trick.card(raw_turn).unwrap(), deal.tricks.len() - 1)
        };
        self.emit(deal_uuid, EventKind::CardPlayed { position: raw_turn, card, hand_index: card_index, trick_index });

        let is_opening_lead = trick_index == 0
            && self
                .current_deal()
                .map_or(false, |d| d.current_trick().map_or(false, |t| t.number_of_cards_played() == 1));
        if is_opening_lead {
            self.emit(deal_uuid, EventKind::DummyRevealed);
        }

        let completed = self.current_deal().and_then(|d| d.current_trick()).map_or(false, Trick::is_completed);
        if !completed {
            if let Some(next_turn) = self.position_in_turn() {
                self.emit(deal_uuid, EventKind::TurnStarted { position: next_turn });
            }
            return true;
        }

        let winner = self.current_deal().and_then(|d| d.current_trick()).and_then(Trick::winner).expect("a completed trick always has a winner");
        self.emit(deal_uuid, EventKind::TrickCompleted { winner, index: trick_index });

        if trick_index == 12 {
            let (tricks_won, declarer, contract) = {
                let deal = match &self.state {
                    State::Active(deal) => deal,
                    _ => unreachable!(),
                };
                (deal.tricks_won(), deal.bidding.declarer().unwrap(), deal.bidding.contract().unwrap())
            };
            let vulnerable = {
                let deal = match &self.state {
                    State::Active(deal) => deal,
                    _ => unreachable!(),
                };
                deal.vulnerability.is_vulnerable(declarer)
            };
            let declarer_side_tricks = if declarer.order() % 2 == 0 { tricks_won.0 } else { tricks_won.1 };
            let result = self.game_manager.borrow_mut().add_result(declarer, contract, declarer_side_tricks, vulnerable);
            self.finish_deal(deal_uuid, tricks_won, result);
        } else {
            let new_leader = winner;
            {
                let deal = match &mut self.state {
                    State::Active(deal) => deal,
                    _ => unreachable!(),
                };
                deal.tricks.push(Trick::new(new_leader, deal.tricks.last().and_then(Trick::trump)));
            }
            // `new_leader` may itself be dummy (dummy can win a trick), so
            // who must act is `position_in_turn`'s declarer-substituted
            // value, not the raw leader `TrickStarted` reports.
            if let Some(next_turn) = self.position_in_turn() {
                self.emit(deal_uuid, EventKind::TurnStarted { position: next_turn });
            }
            self.emit(deal_uuid, EventKind::TrickStarted { leader: new_leader });
        }

        true
    }

    fn finish_deal(&mut self, deal_uuid: Uuid, tricks_won: (u8, u8), result: DuplicateResult) {
        if let State::Active(deal) = &mut self.state {
            deal.phase = Phase::Ended;
        }
        self.emit(deal_uuid, EventKind::DealEnded { tricks_won, result });
        self.state = State::Idle;
    }

    /// Notifies subscribers, deferring if we are already mid-notification
    /// (an observer's own reaction tried to trigger another emit on the
    /// same engine). The first emit in a call chain drains; the rest queue
    /// behind it and run in order once that drain starts unwinding.
    fn emit(&mut self, deal_uuid: Uuid, kind: EventKind) {
        self.counter += 1;
        let event = Event { deal: deal_uuid, counter: self.counter, kind };
        let was_draining = self.queue.is_draining();
        let self_ptr: *mut Engine = self;
        self.queue.call(move || {
            let engine = unsafe { &mut *self_ptr };
            engine.observers.notify_all(&event);
        });
        let _ = was_draining;
    }

    /// Reconstructs the engine from a persisted auction and set of plays.
    /// Fails if replaying the auction would be illegal under the current
    /// rules. `tricks` is trusted as-is (it was itself produced by a prior
    /// engine's validated `play` calls, so it is replayed by direct
    /// assignment rather than re-run through `play`'s turn/ownership
    /// checks); each played card is also marked played on the
    /// corresponding hand so `Hand::is_played`/`is_out_of_suit` agree with
    /// the restored tricks.
    pub fn recall(
        card_manager: Rc<RefCell<dyn CardManager>>,
        game_manager: Rc<RefCell<dyn GameManager>>,
        deal_uuid: Uuid,
        opener: Position,
        vulnerability: Vulnerability,
        mut hands: [crate::hand::Hand; 4],
        calls: &[Call],
        tricks: Vec<Trick>,
    ) -> Result<Engine, EngineError> {
        let bidding = crate::deal::replay_calls(calls, opener).ok_or(EngineError::RecallRejected)?;
        if tricks.len() > 13 {
            return Err(EngineError::RecallRejected);
        }

        for trick in &tricks {
            for &position in &crate::card::POSITIONS {
                let card = match trick.card(position) {
                    Some(card) => card,
                    None => continue,
                };
                let hand = &mut hands[position.order() as usize];
                let hand_index = (0..hand.len()).find(|&i| hand.card(i) == Some(card)).ok_or(EngineError::RecallRejected)?;
                hand.mark_played(hand_index);
            }
        }

        let mut deal = Deal::new(deal_uuid, opener, vulnerability, hands);
        deal.bidding = bidding;
        deal.tricks = tricks;
        if deal.bidding.has_contract() {
            deal.phase = Phase::Playing;
        } else if deal.bidding.has_ended() {
            deal.phase = Phase::Ended;
        }
        // A deal in Playing always has an open trick (even a freshly-started
        // one with no cards played yet) as the last entry of `deal.tricks`;
        // the persisted record is expected to include it.
        if deal.phase == Phase::Playing && deal.tricks.is_empty() {
            return Err(EngineError::RecallRejected);
        }

        Ok(Engine {
            card_manager,
            game_manager,
            players: [None, None, None, None],
            state: State::Active(deal),
            counter: 0,
            observers: Subject::new(),
            queue: FunctionQueue::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bidding::{Bid, Strain};
    use crate::card::{Rank, Suit};
    use crate::game_manager::DuplicateGameManager;
    use crate::hand::Hand;
    use std::cell::RefCell;

    struct FixedDeck {
        completed: bool,
        subject: crate::card_manager::ShuffleSubject,
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
            let arr: [u8; 13] = indices.try_into().expect("13 indices");
            Hand::new(arr)
        }
        fn subscribe(&mut self, observer: std::rc::Weak<RefCell<dyn crate::observer::Observer<crate::card_manager::Shuffled>>>) {
            self.subject.subscribe(observer);
        }
    }

    fn new_engine() -> Engine {
        let card_manager = Rc::new(RefCell::new(FixedDeck { completed: false, subject: Default::default() }));
        let game_manager = Rc::new(RefCell::new(DuplicateGameManager::new()));
        Engine::new(card_manager, game_manager)
    }

    /// A deck whose hands come pre-revealed, so `play` can actually be
    /// exercised past the opening lead without a real shuffle/reveal round.
    struct RevealedDeck {
        completed: bool,
        subject: crate::card_manager::ShuffleSubject,
    }

    impl CardManager for RevealedDeck {
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
            let arr: [u8; 13] = indices.try_into().expect("13 indices");
            let mut hand = Hand::new(arr);
            let deck = CardType::full_deck();
            let cards: Vec<CardType> = indices.iter().map(|&i| deck[i as usize]).collect();
            let all_idx: Vec<usize> = (0..13).collect();
            hand.request_reveal(&all_idx);
            hand.complete_reveal(&all_idx, &cards);
            hand
        }
        fn subscribe(&mut self, observer: std::rc::Weak<RefCell<dyn crate::observer::Observer<crate::card_manager::Shuffled>>>) {
            self.subject.subscribe(observer);
        }
    }

    fn new_engine_with_revealed_hands() -> Engine {
        let card_manager = Rc::new(RefCell::new(RevealedDeck { completed: false, subject: Default::default() }));
        let game_manager = Rc::new(RefCell::new(DuplicateGameManager::new()));
        Engine::new(card_manager, game_manager)
    }

    fn player(name: &str) -> Player {
        Player { uuid: Uuid::new_v4(), user_id: name.to_string() }
    }

    #[test]
    fn start_deal_then_shuffle_completed_enters_bidding() {
        let mut engine = new_engine();
        engine.start_deal(Position::North, Vulnerability::NONE).unwrap();
        engine.shuffle_completed().unwrap();
        assert_eq!(engine.position_in_turn(), Some(Position::North));
    }

    #[test]
    fn auction_ending_in_contract_reaches_playing_phase() {
        let mut engine = new_engine();
        engine.start_deal(Position::North, Vulnerability::NONE).unwrap();
        engine.shuffle_completed().unwrap();

        let north = player("north");
        let east = player("east");
        let south = player("south");
        let west = player("west");
        engine.set_player(Position::North, Some(north.clone()));
        engine.set_player(Position::East, Some(east.clone()));
        engine.set_player(Position::South, Some(south.clone()));
        engine.set_player(Position::West, Some(west.clone()));

        assert!(engine.call(&north, Call::Bid(Bid::new(1, Strain::Clubs).unwrap())));
        assert!(engine.call(&east, Call::Pass));
        assert!(engine.call(&south, Call::Pass));
        assert!(engine.call(&west, Call::Pass));

        let deal = engine.current_deal().unwrap();
        assert_eq!(deal.phase, Phase::Playing);
        assert_eq!(deal.bidding.declarer(), Some(Position::North));
        assert_eq!(engine.hand_in_turn(), Some(Position::East));
    }

    #[test]
    fn pass_out_returns_to_idle() {
        let mut engine = new_engine();
        engine.start_deal(Position::North, Vulnerability::NONE).unwrap();
        engine.shuffle_completed().unwrap();

        let players: Vec<Player> = ["n", "e", "s", "w"].iter().map(|n| player(n)).collect();
        for (i, &position) in crate::card::POSITIONS.iter().enumerate() {
            engine.set_player(position, Some(players[i].clone()));
        }

        for (i, &position) in crate::card::POSITIONS.iter().enumerate() {
            let _ = position;
            assert!(engine.call(&players[i], Call::Pass));
        }

        assert!(engine.current_deal().is_none());
    }

    #[test]
    fn wrong_player_cannot_call_out_of_turn() {
        let mut engine = new_engine();
        engine.start_deal(Position::North, Vulnerability::NONE).unwrap();
        engine.shuffle_completed().unwrap();

        let north = player("north");
        let impostor = player("impostor");
        engine.set_player(Position::North, Some(north));
        engine.set_player(Position::East, Some(impostor.clone()));

        assert!(!engine.call(&impostor, Call::Pass));
    }

    #[test]
    fn recall_reaches_equivalent_state_to_the_engine_it_was_recorded_from() {
        let mut engine = new_engine();
        engine.start_deal(Position::North, Vulnerability::NONE).unwrap();
        engine.shuffle_completed().unwrap();

        let players: Vec<Player> = ["n", "e", "s", "w"].iter().map(|n| player(n)).collect();
        for (i, &position) in crate::card::POSITIONS.iter().enumerate() {
            engine.set_player(position, Some(players[i].clone()));
        }
        assert!(engine.call(&players[0], Call::Bid(Bid::new(1, Strain::Clubs).unwrap())));
        assert!(engine.call(&players[1], Call::Pass));
        assert!(engine.call(&players[2], Call::Pass));
        assert!(engine.call(&players[3], Call::Pass));

        let deal = engine.current_deal().unwrap();
        let calls: Vec<Call> = deal.bidding.calls().iter().map(|&(_, call)| call).collect();
        let hands: [Hand; 4] = crate::card::POSITIONS.map(|p| deal.hand(p).clone());
        let tricks = deal.tricks.clone();
        let deal_uuid = deal.uuid;

        let card_manager = Rc::new(RefCell::new(FixedDeck { completed: false, subject: Default::default() }));
        let game_manager = Rc::new(RefCell::new(DuplicateGameManager::new()));
        let recalled = Engine::recall(card_manager, game_manager, deal_uuid, Position::North, Vulnerability::NONE, hands, &calls, tricks).unwrap();

        assert_eq!(recalled.current_deal().unwrap().phase, Phase::Playing);
        assert_eq!(recalled.hand_in_turn(), Some(Position::East));
    }

    #[test]
    fn declarer_plays_dummys_cards_on_dummys_turn() {
        let mut engine = new_engine_with_revealed_hands();
        engine.start_deal(Position::North, Vulnerability::NONE).unwrap();
        engine.shuffle_completed().unwrap();

        let north = player("north");
        let east = player("east");
        let south = player("south");
        let west = player("west");
        engine.set_player(Position::North, Some(north.clone()));
        engine.set_player(Position::East, Some(east.clone()));
        engine.set_player(Position::South, Some(south.clone()));
        engine.set_player(Position::West, Some(west.clone()));

        assert!(engine.call(&north, Call::Bid(Bid::new(1, Strain::Clubs).unwrap())));
        assert!(engine.call(&east, Call::Pass));
        assert!(engine.call(&south, Call::Pass));
        assert!(engine.call(&west, Call::Pass));

        // North declares, South is dummy, East is on lead.
        assert_eq!(engine.current_deal().unwrap().bidding.declarer(), Some(Position::North));
        assert!(engine.play(&east, Position::East, 0));

        // It is dummy's (South's) seat that must supply the next card, but
        // South itself never acts — declarer does.
        assert_eq!(engine.hand_in_turn(), Some(Position::South));
        assert_eq!(engine.position_in_turn(), Some(Position::North));

        // Dummy's own occupant may not play dummy's hand.
        assert!(!engine.play(&south, Position::South, 0));
        // Declarer may.
        assert!(engine.play(&north, Position::South, 0));
    }
}
