//! The other manager the engine delegates to: turning a completed deal into
//! a scoring result. The variant set is open (a club running rubber bridge
//! would want a different `GameManager`), so this is a trait; the workspace
//! ships the one scoring rule real duplicate-bridge play needs.

use crate::bidding::{Contract, Strain};
use crate::card::Position;
use serde_derive::{Deserialize, Serialize};

/// Either partnership, as the side that held the contract.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Partnership {
    NorthSouth,
    EastWest,
}

impl Partnership {
    #[inline]
    pub fn of(position: Position) -> Partnership {
        if position.order() % 2 == 0 {
            Partnership::NorthSouth
        } else {
            Partnership::EastWest
        }
    }

    #[inline]
    pub fn other(self) -> Partnership {
        match self {
            Partnership::NorthSouth => Partnership::EastWest,
            Partnership::EastWest => Partnership::NorthSouth,
        }
    }
}

/// Result of one scored deal, computed by `GameManager::add_result` /
/// `add_passed_out` and carried in the `DealEnded` event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum DuplicateResult {
    PassedOut,
    Made {
        declarer: Partnership,
        score: i32,
    },
}

/// Delegate the engine asks to score a completed deal. A deal that is
/// scored contributes to some notion of the running game total, but the
/// engine itself has no opinion on what "the game" is — that's entirely up
/// to the manager.
pub trait GameManager {
    fn add_result(
        &mut self,
        declarer: Position,
        contract: Contract,
        tricks_won: u8,
        vulnerable: bool,
    ) -> DuplicateResult;
    fn add_passed_out(&mut self) -> DuplicateResult;
}

/// Standard duplicate-bridge scoring: trick score by strain, game/part-game
/// bonus, slam bonus, vulnerability-adjusted under/overtrick penalties,
/// doubled/redoubled multipliers. Named "duplicate" to match the original's
/// `DuplicateGameManager`, though (per its own doc comment) it is equally
/// used to simulate a single non-rotating social game — "duplicate" refers
/// to the scoring table, not to board rotation (this workspace doesn't
/// implement rotation; see spec Non-goals).
#[derive(Default)]
pub struct DuplicateGameManager {
    history: Vec<DuplicateResult>,
}

impl DuplicateGameManager {
    pub fn new() -> DuplicateGameManager {
        DuplicateGameManager::default()
    }

    pub fn history(&self) -> &[DuplicateResult] {
        &self.history
    }
}

impl GameManager for DuplicateGameManager {
    fn add_result(
        &mut self,
        declarer: Position,
        contract: Contract,
        tricks_won: u8,
        vulnerable: bool,
    ) -> DuplicateResult {
        let declaring_side = Partnership::of(declarer);
        let needed = 6 + contract.bid.level;
        let score = if tricks_won >= needed {
            let overtricks = tricks_won - needed;
            made_score(&contract, overtricks, vulnerable)
        } else {
            let undertricks = needed - tricks_won;
            -penalty_score(&contract, undertricks, vulnerable)
        };

        let result = DuplicateResult::Made { declarer: declaring_side, score };
        self.history.push(result.clone());
        result
    }

    fn add_passed_out(&mut self) -> DuplicateResult {
        let result = DuplicateResult::PassedOut;
        self.history.push(result.clone());
        result
    }
}

fn trick_score(strain: Strain, trick_number: u8) -> i32 {
    match strain {
        Strain::Clubs | Strain::Diamonds => 20,
        Strain::Hearts | Strain::Spades => 30,
        Strain::NoTrump => {
            if trick_number == 1 {
                40
            } else {
                30
            }
        }
    }
}

fn made_score(contract: &Contract, overtricks: u8, vulnerable: bool) -> i32 {
    let level = contract.bid.level;
    let strain = contract.bid.strain;

    let mut contract_points = 0;
    for n in 1..=level {
        contract_points += trick_score(strain, n);
    }

    let multiplier = if contract.redoubled { 4 } else if contract.doubled { 2 } else { 1 };
    contract_points *= multiplier;

    let is_game = contract_points >= 100;
    let part_game_bonus = 50;
    let game_bonus = if vulnerable { 500 } else { 300 };
    let small_slam_bonus = if vulnerable { 750 } else { 500 };
    let grand_slam_bonus = if vulnerable { 1500 } else { 1000 };

    let mut total = contract_points;
    total += if is_game { game_bonus } else { part_game_bonus };

    if level == 6 {
        total += small_slam_bonus;
    } else if level == 7 {
        total += grand_slam_bonus;
    }

    if contract.doubled {
        total += 50;
    } else if contract.redoubled {
        total += 100;
    }

    let overtrick_value = if contract.redoubled {
        if vulnerable { 400 } else { 200 }
    } else if contract.doubled {
        if vulnerable { 200 } else { 100 }
    } else {
        trick_score(strain, level + 1)
    };
    total += overtrick_value * overtricks as i32;

    total
}

fn penalty_score(contract: &Contract, undertricks: u8, vulnerable: bool) -> i32 {
    if !contract.doubled && !contract.redoubled {
        return (if vulnerable { 100 } else { 50 }) * undertricks as i32;
    }

    let multiplier = if contract.redoubled { 2 } else { 1 };
    let mut total = 0;
    for n in 1..=undertricks {
        let step = match (vulnerable, n) {
            (false, 1) => 100,
            (false, _) => 200,
            (true, 1) => 200,
            (true, _) => 300,
        };
        total += step;
    }
    total * multiplier
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bidding::Bid;

    fn contract(level: u8, strain: Strain, doubled: bool, redoubled: bool) -> Contract {
        Contract { bid: Bid::new(level, strain).unwrap(), doubled, redoubled }
    }

    #[test]
    fn three_no_trump_making_exactly_scores_game() {
        let contract = contract(3, Strain::NoTrump, false, false);
        assert_eq!(made_score(&contract, 0, false), 400);
    }

    #[test]
    fn vulnerable_game_bonus_is_larger() {
        let contract = contract(4, Strain::Spades, false, false);
        assert_eq!(made_score(&contract, 0, true), 620);
    }

    #[test]
    fn doubled_undertrick_penalty_escalates() {
        let contract = contract(3, Strain::Hearts, true, false);
        assert_eq!(penalty_score(&contract, 2, false), 300);
    }

    #[test]
    fn small_slam_bonus_applied_when_vulnerable() {
        let contract = contract(6, Strain::NoTrump, false, false);
        let score = made_score(&contract, 0, true);
        assert_eq!(score, 40 + 30 * 5 + 500 + 750);
    }

    #[test]
    fn duplicate_game_manager_records_history() {
        let mut manager = DuplicateGameManager::new();
        let result = manager.add_passed_out();
        assert!(matches!(result, DuplicateResult::PassedOut));
        assert_eq!(manager.history().len(), 1);
    }
}
