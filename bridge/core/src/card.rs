//! The fifty-two card types and the four table positions. A `Card` is a deck
//! slot whose type may or may not be known yet; once revealed its type is
//! fixed for the rest of the deal.

use serde_derive::{Deserialize, Serialize};
use std::fmt;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum Suit {
    Clubs,
    Diamonds,
    Hearts,
    Spades,
}

pub const SUITS: [Suit; 4] = [Suit::Clubs, Suit::Diamonds, Suit::Hearts, Suit::Spades];

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Suit::Clubs => "C",
            Suit::Diamonds => "D",
            Suit::Hearts => "H",
            Suit::Spades => "S",
        };
        write!(f, "{}", symbol)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum Rank {
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
    Ace,
}

pub const RANKS: [Rank; 13] = [
    Rank::Two,
    Rank::Three,
    Rank::Four,
    Rank::Five,
    Rank::Six,
    Rank::Seven,
    Rank::Eight,
    Rank::Nine,
    Rank::Ten,
    Rank::Jack,
    Rank::Queen,
    Rank::King,
    Rank::Ace,
];

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
            Rank::Ace => "A",
        };
        write!(f, "{}", symbol)
    }
}

/// A known card identity. `order` within a suit follows `Rank`'s declared
/// order, which is also low-to-high trick-taking order.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CardType {
    pub rank: Rank,
    pub suit: Suit,
}

impl CardType {
    #[inline]
    pub fn new(rank: Rank, suit: Suit) -> CardType {
        CardType { rank, suit }
    }

    /// The full 52-card deck, in a fixed canonical order: suits in `SUITS`
    /// order, ranks within a suit in `RANKS` order. This is the order deck
    /// indices 0..52 name.
    pub fn full_deck() -> Vec<CardType> {
        let mut deck = Vec::with_capacity(52);
        for &suit in &SUITS {
            for &rank in &RANKS {
                deck.push(CardType::new(rank, suit));
            }
        }
        deck
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.rank, self.suit)
    }
}

/// A card's deck index, table position. N=0, E=1, S=2, W=3, clockwise.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum Position {
    North,
    East,
    South,
    West,
}

pub const POSITIONS: [Position; 4] = [Position::North, Position::East, Position::South, Position::West];

impl Position {
    /// Position's order in the global peer ordering: N=0, E=1, S=2, W=3.
    #[inline]
    pub fn order(self) -> u8 {
        match self {
            Position::North => 0,
            Position::East => 1,
            Position::South => 2,
            Position::West => 3,
        }
    }

    #[inline]
    pub fn from_order(order: u8) -> Option<Position> {
        POSITIONS.get((order % 4) as usize).copied().filter(|_| order < 4)
    }

    #[inline]
    pub fn next(self) -> Position {
        Position::from_order((self.order() + 1) % 4).expect("modular order is always in range")
    }

    #[inline]
    pub fn partner(self) -> Position {
        Position::from_order((self.order() + 2) % 4).expect("modular order is always in range")
    }

    /// The 13 deck indices dealt to this position: `[13*order, 13*order+13)`.
    #[inline]
    pub fn deck_indices(self) -> std::ops::Range<u8> {
        let base = self.order() * 13;
        base..(base + 13)
    }

    #[inline]
    pub fn is_partnership(self, other: Position) -> bool {
        self.order() % 2 == other.order() % 2
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Position::North => "N",
            Position::East => "E",
            Position::South => "S",
            Position::West => "W",
        };
        write!(f, "{}", symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_deck_has_fifty_two_distinct_cards() {
        let deck = CardType::full_deck();
        assert_eq!(deck.len(), 52);

        let mut seen = std::collections::HashSet::new();
        for card in &deck {
            assert!(seen.insert((card.rank, card.suit)));
        }
    }

    #[test]
    fn deck_indices_partition_the_deck() {
        let mut covered = std::collections::HashSet::new();
        for &position in &POSITIONS {
            for idx in position.deck_indices() {
                assert!(covered.insert(idx), "index {} claimed twice", idx);
            }
        }
        assert_eq!(covered.len(), 52);
    }

    #[test]
    fn position_cycles_clockwise() {
        assert_eq!(Position::North.next(), Position::East);
        assert_eq!(Position::West.next(), Position::North);
        assert_eq!(Position::North.partner(), Position::South);
    }
}
