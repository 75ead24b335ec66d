//! Persistence for games, deals, and players (spec §4.10), backed by a
//! `sled` tree per record kind and keyed by UUID bytes. The deal record is
//! exactly the binary layout spec.md names: 52 bytes of card types in deck
//! order, one packed byte of opening position plus vulnerability, a
//! variable-length call sequence, then a variable-length trick sequence.
//! Records carry a version byte; a mismatched version on recall is treated
//! as "not found" rather than corrupting state.

use bridge_core::bidding::{Bid, Call, Strain};
use bridge_core::card::{CardType, Position, Rank, Suit, POSITIONS, RANKS, SUITS};
use bridge_core::deal::{Deal, Vulnerability};
use bridge_core::hand::Hand;
use bridge_core::trick::Trick;
use std::fmt;
use std::path::Path;
use uuid::Uuid;

const DEAL_RECORD_VERSION: u8 = 1;
const PLAYER_RECORD_VERSION: u8 = 1;

#[derive(Debug)]
pub enum RecordError {
    Io(sled::Error),
    NotFound,
    Malformed,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::Io(err) => write!(f, "persistence backend error: {}", err),
            RecordError::NotFound => write!(f, "no record found"),
            RecordError::Malformed => write!(f, "stored record did not match the expected layout"),
        }
    }
}

impl std::error::Error for RecordError {}

impl From<sled::Error> for RecordError {
    fn from(err: sled::Error) -> RecordError {
        RecordError::Io(err)
    }
}

/// The pieces needed to reconstruct an `Engine` via `Engine::recall`, plus
/// the opener (not itself part of `Deal` but required to replay the
/// auction).
pub struct DealRecord {
    pub opener: Position,
    pub vulnerability: Vulnerability,
    pub hands: [Hand; 4],
    pub calls: Vec<Call>,
    pub tricks: Vec<Trick>,
}

/// Card-type index within `CardType::full_deck()`'s canonical order, the
/// unit the deal record's 52-byte deck section is expressed in.
fn deck_type_index(card: CardType) -> u8 {
    let suit_idx = SUITS.iter().position(|&s| s == card.suit).expect("every suit is in SUITS");
    let rank_idx = RANKS.iter().position(|&r| r == card.rank).expect("every rank is in RANKS");
    (suit_idx * RANKS.len() + rank_idx) as u8
}

fn card_type_from_index(index: u8) -> Option<CardType> {
    CardType::full_deck().get(index as usize).copied()
}

fn encode_call(call: Call) -> u8 {
    match call {
        Call::Pass => 0x80,
        Call::Double => 0x81,
        Call::Redouble => 0x82,
        Call::Bid(bid) => {
            let strain_idx = match bid.strain {
                Strain::Clubs => 0,
                Strain::Diamonds => 1,
                Strain::Hearts => 2,
                Strain::Spades => 3,
                Strain::NoTrump => 4,
            };
            (bid.level - 1) * 5 + strain_idx
        }
    }
}

fn decode_call(byte: u8) -> Option<Call> {
    if byte & 0x80 != 0 {
        match byte & 0x7f {
            0 => Some(Call::Pass),
            1 => Some(Call::Double),
            2 => Some(Call::Redouble),
            _ => None,
        }
    } else {
        let level = byte / 5 + 1;
        let strain = match byte % 5 {
            0 => Strain::Clubs,
            1 => Strain::Diamonds,
            2 => Strain::Hearts,
            3 => Strain::Spades,
            _ => Strain::NoTrump,
        };
        Bid::new(level, strain).map(Call::Bid)
    }
}

/// Packs a trick's four positional plays (leader first, clockwise) into the
/// four "optional card" bytes the record format specifies, independent of
/// how many have actually been played yet.
fn encode_trick(trick: &Trick) -> [u8; 5] {
    let mut bytes = [0u8; 5];
    bytes[0] = trick.leader().order();
    let mut position = trick.leader();
    for slot in bytes.iter_mut().skip(1) {
        *slot = match trick.card(position) {
            Some(card) => 0x80 | deck_type_index(card),
            None => 0,
        };
        position = position.next();
    }
    bytes
}

fn decode_trick(bytes: &[u8], trump: Option<Suit>) -> Option<Trick> {
    if bytes.len() != 5 {
        return None;
    }
    let leader = Position::from_order(bytes[0])?;
    let mut trick = Trick::new(leader, trump);
    let mut position = leader;
    for &byte in &bytes[1..] {
        if byte & 0x80 != 0 {
            let card = card_type_from_index(byte & 0x7f)?;
            if !trick.play(position, card) {
                return None;
            }
        } else if trick.number_of_cards_played() > 0 && position != trick.position_in_turn().unwrap_or(position) {
            // A gap (no card recorded) followed by a later played card would
            // mean the trick was played out of rotation; the record is
            // corrupt rather than merely incomplete.
            return None;
        }
        position = position.next();
    }
    Some(trick)
}

fn trick_trump(tricks: &[Trick]) -> Option<Suit> {
    tricks.first().and_then(Trick::trump)
}

fn encode_deal(deal: &Deal, opener: Position) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(64);
    bytes.push(DEAL_RECORD_VERSION);

    let mut deck = [0u8; 52];
    for &position in &POSITIONS {
        let hand = deal.hand(position);
        for hand_index in 0..hand.len() {
            if let (Some(deck_index), Some(card)) = (hand.deck_index(hand_index), hand.card(hand_index)) {
                deck[deck_index as usize] = deck_type_index(card);
            }
        }
    }
    bytes.extend_from_slice(&deck);

    let vulnerability_byte =
        opener.order() | ((deal.vulnerability.north_south as u8) << 2) | ((deal.vulnerability.east_west as u8) << 3);
    bytes.push(vulnerability_byte);

    let calls: Vec<u8> = deal.bidding.calls().iter().map(|&(_, call)| encode_call(call)).collect();
    bytes.push(calls.len() as u8);
    bytes.extend(calls);

    bytes.push(deal.tricks.len() as u8);
    for trick in &deal.tricks {
        bytes.extend_from_slice(&encode_trick(trick));
    }

    bytes
}

fn decode_deal(bytes: &[u8]) -> Option<DealRecord> {
    if bytes.first().copied() != Some(DEAL_RECORD_VERSION) {
        return None;
    }
    let mut cursor = 1usize;

    let deck_bytes = bytes.get(cursor..cursor + 52)?;
    cursor += 52;
    let mut deck = [CardType::new(Rank::Two, Suit::Clubs); 52];
    for (slot, &byte) in deck.iter_mut().zip(deck_bytes) {
        *slot = card_type_from_index(byte)?;
    }

    let packed = *bytes.get(cursor)?;
    cursor += 1;
    let opener = Position::from_order(packed & 0x03)?;
    let vulnerability = Vulnerability {
        north_south: packed & 0x04 != 0,
        east_west: packed & 0x08 != 0,
    };

    let number_of_calls = *bytes.get(cursor)? as usize;
    cursor += 1;
    let call_bytes = bytes.get(cursor..cursor + number_of_calls)?;
    cursor += number_of_calls;
    let calls: Vec<Call> = call_bytes.iter().map(|&b| decode_call(b)).collect::<Option<Vec<_>>>()?;

    let number_of_tricks = *bytes.get(cursor)? as usize;
    cursor += 1;

    let mut hands: Vec<Hand> = POSITIONS
        .iter()
        .map(|&position| {
            let deck_indices: [u8; 13] = position.deck_indices().collect::<Vec<u8>>().try_into().expect("13 indices");
            let mut hand = Hand::new(deck_indices);
            let indices: Vec<usize> = (0..13).collect();
            let cards: Vec<CardType> = deck_indices.iter().map(|&i| deck[i as usize]).collect();
            hand.request_reveal(&indices);
            hand.complete_reveal(&indices, &cards);
            hand
        })
        .collect();

    // `trump` is derived once from the contract; every persisted trick
    // shares it, matching how the engine threads a single trump through a
    // deal's tricks.
    let contract_trump = bidding_trump(opener, &calls);
    let mut tricks = Vec::with_capacity(number_of_tricks);
    for _ in 0..number_of_tricks {
        let record = bytes.get(cursor..cursor + 5)?;
        cursor += 5;
        let trick = decode_trick(record, contract_trump.or_else(|| trick_trump(&tricks)))?;
        tricks.push(trick);
    }

    for trick in &tricks {
        for &position in &POSITIONS {
            if let Some(card) = trick.card(position) {
                let hand = &mut hands[position.order() as usize];
                let hand_index = (0..hand.len()).find(|&i| hand.card(i) == Some(card))?;
                hand.mark_played(hand_index);
            }
        }
    }

    let hands: [Hand; 4] = hands.try_into().unwrap_or_else(|_| unreachable!());

    Some(DealRecord { opener, vulnerability, hands, calls, tricks })
}

/// Replays `calls` against `opener` just far enough to learn the contract's
/// trump suit, if the auction reached one — used to fill in the trump on
/// decoded tricks without depending on `Deal`/`Bidding` construction order.
fn bidding_trump(opener: Position, calls: &[Call]) -> Option<Suit> {
    let bidding = bridge_core::deal::replay_calls(calls, opener)?;
    let contract = bidding.contract()?;
    match contract.bid.strain {
        Strain::NoTrump => None,
        Strain::Clubs => Some(Suit::Clubs),
        Strain::Diamonds => Some(Suit::Diamonds),
        Strain::Hearts => Some(Suit::Hearts),
        Strain::Spades => Some(Suit::Spades),
    }
}

pub struct Recorder {
    games: sled::Tree,
    deals: sled::Tree,
    players: sled::Tree,
}

impl Recorder {
    pub fn open(path: impl AsRef<Path>) -> Result<Recorder, RecordError> {
        let db = sled::open(path)?;
        Ok(Recorder {
            games: db.open_tree("games")?,
            deals: db.open_tree("deals")?,
            players: db.open_tree("players")?,
        })
    }

    /// `game_state` is an opaque, caller-encoded blob (the bridge game's own
    /// serialized setup: controlled positions, permitted participants,
    /// position → player-uuid map); the recorder does not interpret it.
    pub fn record_game(&self, game_uuid: Uuid, game_state: &[u8]) -> Result<(), RecordError> {
        self.games.insert(game_uuid.as_bytes(), game_state)?;
        Ok(())
    }

    pub fn recall_game(&self, game_uuid: Uuid) -> Result<Vec<u8>, RecordError> {
        self.games.get(game_uuid.as_bytes())?.map(|v| v.to_vec()).ok_or(RecordError::NotFound)
    }

    pub fn record_deal(&self, deal: &Deal, opener: Position) -> Result<(), RecordError> {
        self.deals.insert(deal.uuid.as_bytes(), encode_deal(deal, opener))?;
        Ok(())
    }

    pub fn recall_deal(&self, deal_uuid: Uuid) -> Result<DealRecord, RecordError> {
        let bytes = self.deals.get(deal_uuid.as_bytes())?.ok_or(RecordError::NotFound)?;
        decode_deal(&bytes).ok_or(RecordError::Malformed)
    }

    pub fn record_player(&self, player_uuid: Uuid, user_id: &str) -> Result<(), RecordError> {
        let mut bytes = vec![PLAYER_RECORD_VERSION];
        bytes.extend_from_slice(user_id.as_bytes());
        self.players.insert(player_uuid.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn recall_player(&self, player_uuid: Uuid) -> Result<String, RecordError> {
        let bytes = self.players.get(player_uuid.as_bytes())?.ok_or(RecordError::NotFound)?;
        if bytes.first().copied() != Some(PLAYER_RECORD_VERSION) {
            return Err(RecordError::Malformed);
        }
        String::from_utf8(bytes[1..].to_vec()).map_err(|_| RecordError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::bidding::Bidding;

    fn full_deal(uuid: Uuid, opener: Position) -> Deal {
        let deck = CardType::full_deck();
        let hands: Vec<Hand> = POSITIONS
            .iter()
            .map(|&position| {
                let deck_indices: [u8; 13] = position.deck_indices().collect::<Vec<u8>>().try_into().unwrap();
                let mut hand = Hand::new(deck_indices);
                let indices: Vec<usize> = (0..13).collect();
                let cards: Vec<CardType> = deck_indices.iter().map(|&i| deck[i as usize]).collect();
                hand.request_reveal(&indices);
                hand.complete_reveal(&indices, &cards);
                hand
            })
            .collect();
        let hands: [Hand; 4] = hands.try_into().unwrap();
        let mut deal = Deal::new(uuid, opener, Vulnerability::BOTH, hands);
        deal.bidding = Bidding::new(opener);
        deal
    }

    #[test]
    fn call_round_trips_through_its_byte_encoding() {
        for &call in &[
            Call::Pass,
            Call::Double,
            Call::Redouble,
            Call::Bid(Bid::new(1, Strain::Clubs).unwrap()),
            Call::Bid(Bid::new(7, Strain::NoTrump).unwrap()),
            Call::Bid(Bid::new(3, Strain::Hearts).unwrap()),
        ] {
            assert_eq!(decode_call(encode_call(call)), Some(call));
        }
    }

    #[test]
    fn deal_with_a_finished_auction_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::open(dir.path()).unwrap();

        let mut deal = full_deal(Uuid::new_v4(), Position::North);
        assert!(deal.bidding.call(Position::North, Call::Bid(Bid::new(1, Strain::Clubs).unwrap())));
        assert!(deal.bidding.call(Position::East, Call::Pass));
        assert!(deal.bidding.call(Position::South, Call::Pass));
        assert!(deal.bidding.call(Position::West, Call::Pass));

        recorder.record_deal(&deal, Position::North).unwrap();
        let record = recorder.recall_deal(deal.uuid).unwrap();

        assert_eq!(record.opener, Position::North);
        assert_eq!(record.calls.len(), 4);
        assert_eq!(record.vulnerability, Vulnerability::BOTH);
        assert_eq!(record.hands[0].card(0), deal.hand(Position::North).card(0));
    }

    #[test]
    fn recall_of_an_unknown_deal_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::open(dir.path()).unwrap();
        assert!(matches!(recorder.recall_deal(Uuid::new_v4()), Err(RecordError::NotFound)));
    }

    #[test]
    fn player_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::open(dir.path()).unwrap();
        let uuid = Uuid::new_v4();
        recorder.record_player(uuid, "alice").unwrap();
        assert_eq!(recorder.recall_player(uuid).unwrap(), "alice");
    }
}
