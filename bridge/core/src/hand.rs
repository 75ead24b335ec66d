//! A hand: 13 references into the shuffled deck, each possibly still hidden
//! from this node, each possibly already played.

use crate::card::{CardType, Suit};
use serde_derive::{Deserialize, Serialize};

/// Whether a hidden card is demonstrably out of a suit. `Indeterminate`
/// means the card has not been revealed to this node, so it could be either.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutOfSuit {
    Yes,
    No,
    Indeterminate,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum RevealState {
    Hidden,
    Requested,
    Revealed(CardType),
}

#[derive(Clone, Debug)]
struct Slot {
    reveal: RevealState,
    played: bool,
}

/// An ordered 13-slot hand. Slots are addressed by index 0..13, stable for
/// the duration of the deal. The deck index each slot refers to is assigned
/// once by `Hand::new` and never changes afterward.
#[derive(Clone, Debug)]
pub struct Hand {
    deck_indices: [u8; 13],
    slots: Vec<Slot>,
}

impl Hand {
    /// Constructs a freshly-dealt hand over the given deck indices, all
    /// cards hidden and unplayed.
    pub fn new(deck_indices: [u8; 13]) -> Hand {
        Hand {
            deck_indices,
            slots: vec![
                Slot {
                    reveal: RevealState::Hidden,
                    played: false,
                };
                13
            ],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    #[inline]
    pub fn deck_index(&self, hand_index: usize) -> Option<u8> {
        self.deck_indices.get(hand_index).copied()
    }

    /// Known card type at `hand_index`, if it has been revealed to this node.
    #[inline]
    pub fn card(&self, hand_index: usize) -> Option<CardType> {
        match self.slots.get(hand_index)?.reveal {
            RevealState::Revealed(card) => Some(card),
            _ => None,
        }
    }

    #[inline]
    pub fn is_played(&self, hand_index: usize) -> bool {
        self.slots.get(hand_index).map_or(false, |slot| slot.played)
    }

    /// Marks the card at `hand_index` as played. No-op (returns false) if
    /// already played or the index is out of range.
    pub fn mark_played(&mut self, hand_index: usize) -> bool {
        match self.slots.get_mut(hand_index) {
            Some(slot) if !slot.played => {
                slot.played = true;
                true
            }
            _ => false,
        }
    }

    /// Begins revealing a range of indices: marks them `Requested` so a
    /// concurrent second request against the same indices can be detected.
    /// Returns false if any index is out of range or already requested.
    pub fn request_reveal(&mut self, hand_indices: &[usize]) -> bool {
        if hand_indices
            .iter()
            .any(|&idx| !matches!(self.slots.get(idx).map(|s| s.reveal), Some(RevealState::Hidden)))
        {
            return false;
        }

        for &idx in hand_indices {
            self.slots[idx].reveal = RevealState::Requested;
        }
        true
    }

    /// Completes a previously requested reveal, fixing the card types.
    /// `cards` must be in the same order as the `hand_indices` passed to
    /// `request_reveal`.
    pub fn complete_reveal(&mut self, hand_indices: &[usize], cards: &[CardType]) {
        for (&idx, &card) in hand_indices.iter().zip(cards.iter()) {
            self.slots[idx].reveal = RevealState::Revealed(card);
        }
    }

    /// Three-valued predicate: is this hand out of `suit`? `No` if any
    /// revealed, unplayed card is of that suit; `Yes` if every unplayed card
    /// is revealed and none is of that suit; `Indeterminate` otherwise.
    pub fn is_out_of_suit(&self, suit: Suit) -> OutOfSuit {
        let mut any_hidden_unplayed = false;

        for slot in &self.slots {
            if slot.played {
                continue;
            }
            match slot.reveal {
                RevealState::Revealed(card) if card.suit == suit => return OutOfSuit::No,
                RevealState::Revealed(_) => {}
                RevealState::Hidden | RevealState::Requested => any_hidden_unplayed = true,
            }
        }

        if any_hidden_unplayed {
            OutOfSuit::Indeterminate
        } else {
            OutOfSuit::Yes
        }
    }

    /// Every unplayed hand index still holding a revealed card, for
    /// computing the allowed-cards set.
    pub fn unplayed_revealed_indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.played && matches!(slot.reveal, RevealState::Revealed(_)))
            .map(|(idx, _)| idx)
            .collect()
    }
}

/// Wire-safe snapshot of a hand's known contents, used for `get` snapshots
/// and recall. Unknown or played cards appear as `None`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HandView(pub Vec<Option<CardType>>);

impl Hand {
    pub fn view(&self) -> HandView {
        HandView(
            self.slots
                .iter()
                .map(|slot| match slot.reveal {
                    RevealState::Revealed(card) if !slot.played => Some(card),
                    _ => None,
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::Rank;

    fn indices() -> [u8; 13] {
        let mut out = [0u8; 13];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = i as u8;
        }
        out
    }

    #[test]
    fn freshly_dealt_hand_has_no_known_cards() {
        let hand = Hand::new(indices());
        assert_eq!(hand.card(0), None);
        assert!(!hand.is_played(0));
    }

    #[test]
    fn reveal_then_query_returns_card() {
        let mut hand = Hand::new(indices());
        assert!(hand.request_reveal(&[0, 1]));
        hand.complete_reveal(&[0, 1], &[CardType::new(Rank::Ace, Suit::Spades), CardType::new(Rank::Two, Suit::Clubs)]);
        assert_eq!(hand.card(0), Some(CardType::new(Rank::Ace, Suit::Spades)));
        assert_eq!(hand.card(1), Some(CardType::new(Rank::Two, Suit::Clubs)));
    }

    #[test]
    fn double_reveal_request_rejected() {
        let mut hand = Hand::new(indices());
        assert!(hand.request_reveal(&[0]));
        assert!(!hand.request_reveal(&[0]));
    }

    #[test]
    fn out_of_suit_is_indeterminate_while_hidden() {
        let hand = Hand::new(indices());
        assert_eq!(hand.is_out_of_suit(Suit::Spades), OutOfSuit::Indeterminate);
    }

    #[test]
    fn out_of_suit_is_no_once_a_matching_card_is_revealed() {
        let mut hand = Hand::new(indices());
        hand.request_reveal(&[0]);
        hand.complete_reveal(&[0], &[CardType::new(Rank::Ace, Suit::Spades)]);
        assert_eq!(hand.is_out_of_suit(Suit::Spades), OutOfSuit::No);
    }

    #[test]
    fn out_of_suit_is_yes_once_every_unplayed_card_is_known_and_none_matches() {
        let mut hand = Hand::new(indices());
        let all_idx: Vec<usize> = (0..13).collect();
        hand.request_reveal(&all_idx);
        let cards: Vec<CardType> = (0..13).map(|i| CardType::new(Rank::Two, if i == 0 { Suit::Clubs } else { Suit::Hearts })).collect();
        hand.complete_reveal(&all_idx, &cards);
        assert_eq!(hand.is_out_of_suit(Suit::Spades), OutOfSuit::Yes);
    }

    #[test]
    fn mark_played_is_idempotent_false_on_second_call() {
        let mut hand = Hand::new(indices());
        assert!(hand.mark_played(0));
        assert!(!hand.mark_played(0));
    }
}
