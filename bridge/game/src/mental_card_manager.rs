//! The mental-card proxy `CardManager`: drives the local card-server
//! process through its control socket. `request_shuffle` runs the full
//! card-exchange sequence for a new deal (spec §4.6 last paragraph):
//! `shuffle`, then for each peer in order, `draw` (self) or `reveal`
//! (everyone else) over that peer's thirteen initial indices — so that by
//! the time `Shuffled` fires, every node's own hand is already revealed to
//! itself and every other node has proven (via `reveal`) that it may learn
//! the same indices.

use crate::cardserver_client::ControlClient;
use bridge_core::card::{CardType, Position, POSITIONS};
use bridge_core::card_manager::{CardManager, ShuffleSubject, Shuffled};
use bridge_core::hand::Hand;
use bridge_core::observer::Observer;
use std::cell::RefCell;
use std::rc::Weak;

fn encode_cards(cards: &[u8]) -> Vec<u8> {
    serde_json::to_vec(cards).expect("json encoding of a u8 list never fails")
}

fn decode_revealed(bytes: &[u8]) -> Vec<Option<u8>> {
    serde_json::from_slice(bytes).unwrap_or_else(|_| vec![None; 52])
}

/// Translates a card-server "card type index" (0..52, in
/// `CardType::full_deck()` order) back into a `CardType`.
fn card_type_at(index: u8) -> CardType {
    CardType::full_deck()[index as usize]
}

pub struct MentalCardManager {
    self_position: Position,
    client: ControlClient,
    revealed: [Option<CardType>; 52],
    shuffle_completed: bool,
    subject: ShuffleSubject,
}

impl MentalCardManager {
    pub fn new(self_position: Position, client: ControlClient) -> MentalCardManager {
        MentalCardManager {
            self_position,
            client,
            revealed: [None; 52],
            shuffle_completed: false,
            subject: ShuffleSubject::new(),
        }
    }

    /// Opens (if `self_position` owns `deck_index`) or asserts the right of
    /// the owning peer to open a single already-played card's index, as
    /// required every time any card is played anywhere at the table.
    pub fn reveal_played_card(&mut self, deck_index: u8) -> Result<Option<CardType>, bridgeutil::error::ProtocolError> {
        let output = self.client.call("revealall", vec![b"cards".to_vec(), encode_cards(&[deck_index])])?;
        self.apply_revealed(&output)?;
        Ok(self.revealed[deck_index as usize])
    }

    /// Opens every index of `dummy`'s hand, called once the opening lead
    /// has been played (spec §4.6: dummy becomes visible to all at that
    /// point).
    pub fn reveal_dummy(&mut self, dummy: Position) -> Result<(), bridgeutil::error::ProtocolError> {
        let indices: Vec<u8> = dummy.deck_indices().collect();
        let output = self.client.call("revealall", vec![b"cards".to_vec(), encode_cards(&indices)])?;
        self.apply_revealed(&output)
    }

    /// The card this node has learned for `deck_index`, if any — used to
    /// feed a `reveal_dummy` result back into `Engine::reveal` one hand
    /// slot at a time.
    pub fn revealed_card(&self, deck_index: u8) -> Option<CardType> {
        self.revealed[deck_index as usize]
    }

    fn apply_revealed(&mut self, output: &[Vec<u8>]) -> Result<(), bridgeutil::error::ProtocolError> {
        let frame = output
            .first()
            .ok_or_else(|| bridgeutil::error::ProtocolError::Malformed("revealall reply missing payload".into()))?;
        for (index, slot) in decode_revealed(frame).into_iter().enumerate() {
            if let Some(type_index) = slot {
                self.revealed[index] = Some(card_type_at(type_index));
            }
        }
        Ok(())
    }

    fn run_deal_sequence(&mut self) -> Result<(), bridgeutil::error::ProtocolError> {
        self.client.call("shuffle", Vec::new())?;

        for &position in &POSITIONS {
            let indices: Vec<u8> = position.deck_indices().collect();
            if position == self.self_position {
                let output = self.client.call("draw", vec![b"cards".to_vec(), encode_cards(&indices)])?;
                self.apply_revealed(&output)?;
            } else {
                self.client.call(
                    "reveal",
                    vec![b"order".to_vec(), vec![position.order()], b"cards".to_vec(), encode_cards(&indices)],
                )?;
            }
        }
        Ok(())
    }
}

impl CardManager for MentalCardManager {
    fn request_shuffle(&mut self) {
        self.shuffle_completed = false;
        self.revealed = [None; 52];
        if self.run_deal_sequence().is_ok() {
            self.shuffle_completed = true;
            self.subject.notify_shuffled();
        }
        // A failed sequence leaves `shuffle_completed` false; the engine's
        // `shuffle_completed` call will then report `NotShuffled`. Per
        // spec §5 there is no in-band abort, so a desynced peer is the
        // caller's problem to diagnose out of band.
    }

    fn is_shuffle_completed(&self) -> bool {
        self.shuffle_completed
    }

    fn number_of_cards(&self) -> usize {
        52
    }

    fn hand(&self, indices: &[u8]) -> Hand {
        let deck_indices: [u8; 13] = indices.try_into().expect("13 indices");
        let mut hand = Hand::new(deck_indices);

        let known: Vec<usize> = (0..13).filter(|&i| self.revealed[indices[i] as usize].is_some()).collect();
        if known.is_empty() {
            return hand;
        }
        let cards: Vec<CardType> = known.iter().map(|&i| self.revealed[indices[i] as usize].unwrap()).collect();
        hand.request_reveal(&known);
        hand.complete_reveal(&known, &cards);
        hand
    }

    fn subscribe(&mut self, observer: Weak<RefCell<dyn Observer<Shuffled>>>) {
        self.subject.subscribe(observer);
    }
}
