//! The plaintext card protocol (spec §4.5): used when one node controls
//! every position, or all peers already trust one another. The leader (the
//! node controlling the lowest-ordered position) generates the permutation
//! itself and broadcasts it; everyone else just waits for that broadcast.

use bridge_core::card::CardType;
use bridge_core::card_manager::{CardManager, ShuffleSubject, Shuffled};
use bridge_core::hand::Hand;
use bridge_core::observer::Observer;
use rand::seq::SliceRandom;
use std::cell::RefCell;
use std::rc::Weak;

/// Sends the freshly generated deal to every peer node, as the leader's
/// `deal` command broadcast.
pub trait DealBroadcaster {
    fn broadcast_deal(&mut self, deck: &[CardType; 52]);
}

pub struct SimpleCardManager {
    is_leader: bool,
    broadcaster: Box<dyn DealBroadcaster>,
    deck: Option<[CardType; 52]>,
    subject: ShuffleSubject,
}

impl SimpleCardManager {
    pub fn new(is_leader: bool, broadcaster: Box<dyn DealBroadcaster>) -> SimpleCardManager {
        SimpleCardManager {
            is_leader,
            broadcaster,
            deck: None,
            subject: ShuffleSubject::new(),
        }
    }

    /// Applies a `deal` command received from the leader (a non-leader's
    /// only way to learn a permutation), or replayed on recall.
    pub fn receive_deal(&mut self, deck: [CardType; 52]) {
        self.deck = Some(deck);
        self.subject.notify_shuffled();
    }
}

impl CardManager for SimpleCardManager {
    fn request_shuffle(&mut self) {
        self.deck = None;
        if !self.is_leader {
            // Non-leaders wait for the leader's `deal` broadcast; see
            // `receive_deal`.
            return;
        }

        let mut deck: Vec<CardType> = CardType::full_deck();
        deck.shuffle(&mut rand::thread_rng());
        let deck: [CardType; 52] = deck.try_into().unwrap_or_else(|_| unreachable!());

        self.broadcaster.broadcast_deal(&deck);
        self.deck = Some(deck);
        self.subject.notify_shuffled();
    }

    fn is_shuffle_completed(&self) -> bool {
        self.deck.is_some()
    }

    fn number_of_cards(&self) -> usize {
        52
    }

    fn hand(&self, indices: &[u8]) -> Hand {
        let deck = self.deck.as_ref().expect("shuffle must have completed before hand() is called");
        let deck_indices: [u8; 13] = indices.try_into().expect("13 indices");
        let mut hand = Hand::new(deck_indices);

        let hand_indices: Vec<usize> = (0..13).collect();
        let cards: Vec<CardType> = indices.iter().map(|&i| deck[i as usize]).collect();
        hand.request_reveal(&hand_indices);
        hand.complete_reveal(&hand_indices, &cards);
        hand
    }

    fn subscribe(&mut self, observer: Weak<RefCell<dyn Observer<Shuffled>>>) {
        self.subject.subscribe(observer);
    }
}
