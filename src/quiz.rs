//! Quiz record model
//!
//! These are the shapes persisted in the per-user documents and served over
//! the HTTP surface, so every field uses its wire name. A record's identity
//! is a truncated SHA-1 over the position, ply coordinates, and user name,
//! which makes re-analysis of the same match idempotent.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::board::{Dice, Player};

/// Number of hex characters kept from the SHA-1 digest
const ID_LEN: usize = 16;

/// A move choice offered by a quiz: the text in engine notation plus its
/// equity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveChoice {
    #[serde(rename = "move")]
    pub move_text: String,
    pub equity: f64,
}

/// What the user actually played
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserChoice {
    pub name: String,
    #[serde(rename = "move")]
    pub move_text: String,
    pub equity: f64,
    /// 0-indexed rank among the engine's candidates
    pub rank: usize,
}

/// Where in the match the decision happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizContext {
    pub game_number: u32,
    pub ply_index: u32,
    pub player: Player,
    pub dice: Dice,
    pub equity_diff: f64,
}

/// Exposure counters; `correct_answers <= play_count` always holds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizCounters {
    pub play_count: u32,
    pub correct_answers: u32,
}

/// One quiz position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub gnu_id: String,
    pub best: MoveChoice,
    pub user: UserChoice,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub higher_sample: Option<MoveChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_sample: Option<MoveChoice>,
    pub context: QuizContext,
    #[serde(default)]
    pub quiz: QuizCounters,
}

/// The per-user quiz document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizDoc {
    pub engine_available: bool,
    pub threshold: f64,
    #[serde(default)]
    pub positions: Vec<QuizRecord>,
}

impl QuizDoc {
    pub fn empty(threshold: f64) -> Self {
        Self {
            engine_available: false,
            threshold,
            positions: Vec::new(),
        }
    }
}

/// The per-user set of matches already analyzed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedMatches {
    #[serde(default)]
    pub matches: Vec<String>,
}

impl AnalyzedMatches {
    pub fn contains(&self, match_id: &str) -> bool {
        self.matches.iter().any(|m| m == match_id)
    }

    /// Union insert, keeping the set sorted
    pub fn insert(&mut self, match_id: &str) -> bool {
        match self.matches.binary_search_by(|m| m.as_str().cmp(match_id)) {
            Ok(_) => false,
            Err(pos) => {
                self.matches.insert(pos, match_id.to_string());
                true
            }
        }
    }
}

/// Stable content-addressed quiz identity: equal `(gnuId, player,
/// gameNumber, plyIndex, userName)` always produce equal ids.
pub fn quiz_id(
    gnu_id: &str,
    player: Player,
    game_number: u32,
    ply_index: u32,
    user_name: &str,
) -> String {
    let seed = format!(
        "{}|{}|{}|{}|{}",
        gnu_id,
        player.tag(),
        game_number,
        ply_index,
        user_name
    );
    let digest = Sha1::digest(seed.as_bytes());
    let hex = format!("{:x}", digest);
    hex[..ID_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_16_hex_chars_and_deterministic() {
        let a = quiz_id("POS:MATCH", Player::One, 1, 3, "alice");
        let b = quiz_id("POS:MATCH", Player::One, 1, 3, "alice");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn id_varies_with_every_input() {
        let base = quiz_id("POS:MATCH", Player::One, 1, 3, "alice");
        assert_ne!(base, quiz_id("POS:OTHER", Player::One, 1, 3, "alice"));
        assert_ne!(base, quiz_id("POS:MATCH", Player::Two, 1, 3, "alice"));
        assert_ne!(base, quiz_id("POS:MATCH", Player::One, 2, 3, "alice"));
        assert_ne!(base, quiz_id("POS:MATCH", Player::One, 1, 4, "alice"));
        assert_ne!(base, quiz_id("POS:MATCH", Player::One, 1, 3, "bob"));
    }

    #[test]
    fn analyzed_matches_union_stays_sorted() {
        let mut set = AnalyzedMatches::default();
        assert!(set.insert("222"));
        assert!(set.insert("111"));
        assert!(!set.insert("222"));
        assert_eq!(set.matches, vec!["111", "222"]);
        assert!(set.contains("111"));
        assert!(!set.contains("333"));
    }

    #[test]
    fn record_serializes_with_wire_names() {
        let record = QuizRecord {
            id: "abc".to_string(),
            kind: "move".to_string(),
            gnu_id: "P:M".to_string(),
            best: MoveChoice {
                move_text: "8/3 6/3".to_string(),
                equity: 0.087,
            },
            user: UserChoice {
                name: "alice".to_string(),
                move_text: "8/3 8/5".to_string(),
                equity: -0.29,
                rank: 9,
            },
            higher_sample: None,
            lower_sample: None,
            context: QuizContext {
                game_number: 1,
                ply_index: 4,
                player: Player::Two,
                dice: Dice::new(5, 3),
                equity_diff: 0.377,
            },
            quiz: QuizCounters::default(),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["gnuId"], "P:M");
        assert_eq!(json["type"], "move");
        assert_eq!(json["best"]["move"], "8/3 6/3");
        assert_eq!(json["context"]["player"], "player2");
        assert_eq!(json["context"]["equityDiff"], 0.377);
        assert_eq!(json["quiz"]["playCount"], 0);
        assert!(json.get("higherSample").is_none());
    }
}
