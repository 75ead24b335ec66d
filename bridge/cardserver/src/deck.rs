//! The 52-slot masked deck a card server carries across `init`/`shuffle`/
//! `draw`/`reveal`/`revealall`, plus the bookkeeping of which card types
//! have actually been recovered so far.

use crate::crypto::{self, Ciphertext};
use curve25519_dalek::ristretto::RistrettoPoint;

pub const DECK_SIZE: usize = 52;

/// Ordered list of every card point, used to translate a recovered
/// plaintext point back into a deck index (there is no shorter encoding;
/// 52 equality checks is cheap).
fn card_points() -> [RistrettoPoint; DECK_SIZE] {
    let mut points = [RistrettoPoint::default(); DECK_SIZE];
    for (i, slot) in points.iter_mut().enumerate() {
        *slot = crypto::card_point(i as u8);
    }
    points
}

/// A single deck slot: its current masked ciphertext, and the card type it
/// has been revealed to be, if enough peers' shares have combined.
#[derive(Clone)]
pub struct Slot {
    pub ciphertext: Ciphertext,
    pub revealed: Option<u8>,
}

pub struct Deck {
    pub aggregate_public: RistrettoPoint,
    pub slots: Vec<Slot>,
    points: [RistrettoPoint; DECK_SIZE],
}

impl Deck {
    /// Builds the initial deck: each slot `i` masks `card_point(i)` under
    /// the group's aggregate public key, i.e. before any shuffle the deck
    /// index and the card's own identity coincide.
    pub fn new(aggregate_public: RistrettoPoint) -> Deck {
        let points = card_points();
        let slots = points
            .iter()
            .map(|&point| Slot {
                ciphertext: crypto::mask(point, aggregate_public).0,
                revealed: None,
            })
            .collect();
        Deck { aggregate_public, slots, points }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Replaces the deck with a permuted, remasked copy (one peer's
    /// contribution to a collective shuffle).
    pub fn apply_shuffle(&mut self, permutation: &[usize]) -> Vec<Ciphertext> {
        let mut remasked = Vec::with_capacity(self.slots.len());
        for &source in permutation {
            let (ct, _) = crypto::remask(&self.slots[source].ciphertext, self.aggregate_public)
                .expect("source ciphertext always decompresses");
            remasked.push(ct);
        }
        self.slots = remasked
            .iter()
            .cloned()
            .map(|ciphertext| Slot { ciphertext, revealed: None })
            .collect();
        remasked
    }

    /// Identifies which card type `point` corresponds to, if any.
    pub fn identify(&self, point: RistrettoPoint) -> Option<u8> {
        self.points.iter().position(|&p| p == point).map(|i| i as u8)
    }

    pub fn mark_revealed(&mut self, index: usize, card_type: u8) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.revealed = Some(card_type);
        }
    }
}
