//! A deal: one shuffled deck carried through an auction and, if it produced
//! a contract, the play that follows.

use crate::bidding::{Bidding, Call};
use crate::card::{CardType, Position};
use crate::hand::Hand;
use crate::trick::Trick;
use serde_derive::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub north_south: bool,
    pub east_west: bool,
}

impl Vulnerability {
    pub const NONE: Vulnerability = Vulnerability { north_south: false, east_west: false };
    pub const BOTH: Vulnerability = Vulnerability { north_south: true, east_west: true };

    /// Standard duplicate board vulnerability cycle: board `b` (1-based).
    pub fn for_board(board: u32) -> Vulnerability {
        let idx = (board.saturating_sub(1) + (board.saturating_sub(1)) / 4) % 4;
        match idx {
            0 => Vulnerability::NONE,
            1 => Vulnerability { north_south: true, east_west: false },
            2 => Vulnerability { north_south: false, east_west: true },
            _ => Vulnerability::BOTH,
        }
    }

    pub fn is_vulnerable(self, position: Position) -> bool {
        if position.order() % 2 == 0 {
            self.north_south
        } else {
            self.east_west
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Phase {
    Bidding,
    Playing,
    Ended,
}

/// One deal: identity, vulnerability, the four hands, the auction, the
/// tricks played so far, and the current phase.
pub struct Deal {
    pub uuid: Uuid,
    pub vulnerability: Vulnerability,
    hands: [Hand; 4],
    pub bidding: Bidding,
    pub tricks: Vec<Trick>,
    pub phase: Phase,
}

impl Deal {
    pub fn new(uuid: Uuid, opener: Position, vulnerability: Vulnerability, hands: [Hand; 4]) -> Deal {
        Deal {
            uuid,
            vulnerability,
            hands,
            bidding: Bidding::new(opener),
            tricks: Vec::new(),
            phase: Phase::Bidding,
        }
    }

    #[inline]
    pub fn hand(&self, position: Position) -> &Hand {
        &self.hands[position.order() as usize]
    }

    #[inline]
    pub fn hand_mut(&mut self, position: Position) -> &mut Hand {
        &mut self.hands[position.order() as usize]
    }

    pub fn current_trick(&self) -> Option<&Trick> {
        self.tricks.last()
    }

    pub fn current_trick_mut(&mut self) -> Option<&mut Trick> {
        self.tricks.last_mut()
    }

    /// Tricks won by each partnership so far.
    pub fn tricks_won(&self) -> (u8, u8) {
        let mut ns = 0u8;
        let mut ew = 0u8;
        for trick in &self.tricks {
            if let Some(winner) = trick.winner() {
                if winner.order() % 2 == 0 {
                    ns += 1;
                } else {
                    ew += 1;
                }
            }
        }
        (ns, ew)
    }

    /// Opening-lead position, known once the auction has produced a
    /// contract: the declarer's left-hand opponent.
    pub fn opening_leader(&self) -> Option<Position> {
        self.bidding.declarer().map(Position::next)
    }

    pub fn dummy(&self) -> Option<Position> {
        self.bidding.declarer().map(Position::partner)
    }

    /// True once the opening lead has been played (i.e. the first trick has
    /// at least one card), the threshold at which dummy's hand becomes
    /// globally visible.
    pub fn opening_lead_played(&self) -> bool {
        self.tricks
            .first()
            .map_or(false, |trick| trick.number_of_cards_played() > 0)
    }

    /// True iff `position` is visible to every observer: either it is
    /// dummy and the opening lead has been played, or the deal has ended.
    pub fn is_visible_to_all(&self, position: Position) -> bool {
        if self.phase == Phase::Ended {
            return true;
        }
        self.dummy() == Some(position) && self.opening_lead_played()
    }
}

/// Recalled `Call` sequence used to reconstruct a deal's auction from a
/// persisted record.
pub fn replay_calls(calls: &[Call], opener: Position) -> Option<Bidding> {
    Bidding::recall(opener, calls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vulnerability_cycles_every_four_boards() {
        assert_eq!(Vulnerability::for_board(1), Vulnerability::NONE);
        assert_eq!(Vulnerability::for_board(5), Vulnerability::NONE);
        assert_eq!(Vulnerability::for_board(2), Vulnerability { north_south: true, east_west: false });
        assert_eq!(Vulnerability::for_board(4), Vulnerability::BOTH);
    }

    #[test]
    fn is_vulnerable_matches_partnership() {
        let v = Vulnerability { north_south: true, east_west: false };
        assert!(v.is_vulnerable(Position::North));
        assert!(v.is_vulnerable(Position::South));
        assert!(!v.is_vulnerable(Position::East));
    }
}
