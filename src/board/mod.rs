//! In-memory board model
//!
//! Each player owns 26 slots indexed from their own perspective: slot 0 is
//! checkers borne off, 1..=24 are board points (1 = innermost home point),
//! 25 is the bar. At rest every player's slots sum to 15.

pub mod codec;
pub mod moves;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use moves::MovePart;

/// Slot index of checkers borne off
pub const OFF: usize = 0;
/// Slot index of the bar
pub const BAR: usize = 25;
/// Checkers per player
pub const CHECKERS: u8 = 15;

/// One of the two match participants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Player {
    #[serde(rename = "player1")]
    One,
    #[serde(rename = "player2")]
    Two,
}

impl Player {
    pub fn opponent(self) -> Player {
        match self {
            Player::One => Player::Two,
            Player::Two => Player::One,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Player::One => 0,
            Player::Two => 1,
        }
    }

    /// Stable tag used in persisted documents and quiz ids
    pub fn tag(self) -> &'static str {
        match self {
            Player::One => "player1",
            Player::Two => "player2",
        }
    }
}

/// A dice pair; both dies are 1..=6
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dice {
    pub die1: u8,
    pub die2: u8,
}

impl Dice {
    pub fn new(die1: u8, die2: u8) -> Self {
        Self { die1, die2 }
    }

    pub fn is_double(self) -> bool {
        self.die1 == self.die2
    }
}

/// Full board state including the match context carried by the match ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    /// Per-player slot counts, indexed by `Player::index()`
    pub points: [[u8; 26]; 2],
    /// Side to move / roll
    pub turn: Player,
    /// Current dice, if rolled
    pub dice: Option<Dice>,
    /// Doubling cube value, a power of two
    pub cube_value: u32,
    /// Cube owner; `None` means centered
    pub cube_owner: Option<Player>,
    /// Match length in points; `None` means money game
    pub match_length: Option<u32>,
    /// Scores for (player 1, player 2)
    pub score: (u32, u32),
}

impl Board {
    /// The standard starting position: 2 on the 24-point, 5 on the 13-point,
    /// 3 on the 8-point, 5 on the 6-point, for each player from their own
    /// perspective. Player 1 on turn, cube centered at 1.
    pub fn starting() -> Self {
        let mut side = [0u8; 26];
        side[24] = 2;
        side[13] = 5;
        side[8] = 3;
        side[6] = 5;

        Self {
            points: [side, side],
            turn: Player::One,
            dice: None,
            cube_value: 1,
            cube_owner: None,
            match_length: None,
            score: (0, 0),
        }
    }

    /// Total checkers on one side, all 26 slots
    pub fn checker_count(&self, player: Player) -> u32 {
        self.points[player.index()].iter().map(|&n| n as u32).sum()
    }

    /// Apply the parts of a played move for `player`, in order.
    ///
    /// For each part: the checker leaves `from`; on a hit of a board point
    /// the lone opposing checker goes to the opponent's bar; the checker
    /// lands on `to`. Parts with out-of-range indices or an empty source
    /// slot are silently skipped so a malformed transcript cannot corrupt
    /// the replay.
    pub fn apply_move_parts(&mut self, player: Player, parts: &[MovePart]) {
        for part in parts {
            let from = part.from as usize;
            let to = part.to as usize;
            if from < 1 || from > BAR || to > 24 {
                continue;
            }
            if self.points[player.index()][from] == 0 {
                continue;
            }
            self.points[player.index()][from] -= 1;
            if part.hit && (1..=24).contains(&to) {
                let opp = player.opponent().index();
                if self.points[opp][to] > 0 {
                    self.points[opp][to] -= 1;
                    self.points[opp][BAR] += 1;
                }
            }
            self.points[player.index()][to] += 1;
        }
    }

    /// Install an accepted double: the cube moves to `taker` at `value`
    pub fn accept_double(&mut self, taker: Player, value: u32) {
        self.cube_value = value.max(2);
        self.cube_owner = Some(taker);
    }

    /// The engine's 14-character position ID for the current side to move
    pub fn to_position_id(&self) -> String {
        codec::encode_position(self)
    }

    /// The engine's 12-character match ID for the current match context
    pub fn to_match_id(&self) -> String {
        codec::encode_match(self)
    }

    /// The content-addressable `positionId:matchId` pair
    pub fn to_gnu_id(&self) -> String {
        format!("{}:{}", self.to_position_id(), self.to_match_id())
    }

    /// Decode a `positionId:matchId` pair back into a board
    pub fn from_gnu_id(id: &str) -> Result<Board> {
        codec::decode_gnu_id(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(from: u8, to: u8, hit: bool) -> MovePart {
        MovePart { from, to, hit }
    }

    #[test]
    fn starting_position_has_fifteen_checkers_per_side() {
        let board = Board::starting();
        assert_eq!(board.checker_count(Player::One), 15);
        assert_eq!(board.checker_count(Player::Two), 15);
        assert_eq!(board.points[0][24], 2);
        assert_eq!(board.points[0][13], 5);
        assert_eq!(board.points[0][8], 3);
        assert_eq!(board.points[0][6], 5);
    }

    #[test]
    fn apply_preserves_checker_sums() {
        let mut board = Board::starting();
        board.apply_move_parts(Player::One, &[part(24, 18, false), part(13, 7, false)]);
        assert_eq!(board.checker_count(Player::One), 15);
        assert_eq!(board.checker_count(Player::Two), 15);
        assert_eq!(board.points[0][18], 1);
        assert_eq!(board.points[0][7], 1);
        assert_eq!(board.points[0][24], 1);
        assert_eq!(board.points[0][13], 4);
    }

    #[test]
    fn hit_sends_opponent_checker_to_bar() {
        let mut board = Board::starting();
        // Put a lone player-2 checker on the destination slot
        board.points[1][13] -= 1;
        board.points[1][18] += 1;

        board.apply_move_parts(Player::One, &[part(24, 18, true)]);

        assert_eq!(board.points[1][18], 0);
        assert_eq!(board.points[1][BAR], 1);
        assert_eq!(board.points[0][18], 1);
        assert_eq!(board.checker_count(Player::One), 15);
        assert_eq!(board.checker_count(Player::Two), 15);
    }

    #[test]
    fn bearoff_moves_checker_to_slot_zero() {
        let mut board = Board::starting();
        board.points[0] = [0; 26];
        board.points[0][6] = 15;

        board.apply_move_parts(Player::One, &[part(6, 0, false)]);

        assert_eq!(board.points[0][OFF], 1);
        assert_eq!(board.points[0][6], 14);
        assert_eq!(board.checker_count(Player::One), 15);
    }

    #[test]
    fn malformed_parts_are_skipped() {
        let mut board = Board::starting();
        let before = board.clone();
        // Empty source slot and out-of-range source
        board.apply_move_parts(Player::One, &[part(3, 1, false)]);
        assert_eq!(board, before);
    }

    #[test]
    fn bar_reentry_consumes_bar_checker() {
        let mut board = Board::starting();
        board.points[0][24] -= 1;
        board.points[0][BAR] += 1;

        board.apply_move_parts(Player::One, &[part(25, 19, false)]);

        assert_eq!(board.points[0][BAR], 0);
        assert_eq!(board.points[0][19], 1);
        assert_eq!(board.checker_count(Player::One), 15);
    }
}
