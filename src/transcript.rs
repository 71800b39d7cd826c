//! Match transcript parser
//!
//! Recognizes the published match export grammar: a `N point match` header,
//! `Game N` headers followed by a `name : score  name : score` row, then
//! numbered ply rows whose two half-ply columns are separated by a run of two
//! or more spaces. Cube actions are preserved as their own half-ply variants
//! so a later consumer can use them without reparse.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::board::moves::{parse_move_tokens, MovePart};
use crate::board::Dice;
use crate::error::{Error, Result};

static MATCH_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\s+point\s+match").expect("match header regex"));
static GAME_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Game\s+(\d+)").expect("game header regex"));
static SCORE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)\s*:\s*(\d+)\s{2,}(.*?)\s*:\s*(\d+)$").expect("score regex"));
static PLY_ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\)\s*(.*)$").expect("ply row regex"));
static COLUMN_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").expect("column regex"));
static HALF_DOUBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Doubles\s*=>\s*(\d+)$").expect("double regex"));
static HALF_WIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Wins\s+(\d+)\s+points?\.?$").expect("win regex"));
static HALF_MOVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([1-6])([1-6]):\s*(.*)$").expect("move regex"));
static RESULT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)\s*Wins\s+(\d+)\s+points?").expect("result regex"));

/// A parsed match transcript
#[derive(Debug, Clone, PartialEq)]
pub struct MatchTranscript {
    /// Match length in points; `None` when the header is missing
    pub match_length: Option<u32>,
    pub games: Vec<Game>,
}

/// One game within a match
#[derive(Debug, Clone, PartialEq)]
pub struct Game {
    pub number: u32,
    pub player1: Option<String>,
    pub player2: Option<String>,
    /// Score at the start of the game (player 1, player 2)
    pub starting_score: (u32, u32),
    pub plies: Vec<Ply>,
    pub result: Option<GameResult>,
}

/// One numbered row: a half-ply per player
#[derive(Debug, Clone, PartialEq)]
pub struct Ply {
    pub number: u32,
    pub player1: HalfPly,
    pub player2: HalfPly,
}

/// What one player did on their half of a ply
#[derive(Debug, Clone, PartialEq)]
pub enum HalfPly {
    /// A checker play; an empty part list is a forced pass (the player
    /// rolled but had no legal move)
    Move { dice: Dice, parts: Vec<MovePart> },
    Double { value: u32 },
    Take,
    Drop,
    Win { points: u32 },
    NoMove,
    /// Unrecognized column text, retained so ply alignment survives
    Unknown { text: String },
}

impl HalfPly {
    pub fn is_move(&self) -> bool {
        matches!(self, HalfPly::Move { .. })
    }
}

/// Terminal result of a game
#[derive(Debug, Clone, PartialEq)]
pub struct GameResult {
    pub winner: Option<String>,
    pub points: u32,
    /// Set when the winning line carries the `and the match` suffix
    pub wins_match: bool,
}

/// Parse a complete transcript. Structural failures (a ply row before any
/// game header) abort with `Error::Unparseable`; a missing match-length
/// header or score row degrades gracefully per the grammar.
pub fn parse(text: &str) -> Result<MatchTranscript> {
    let mut match_length = None;
    let mut games: Vec<Game> = Vec::new();
    let mut seen_first_line = false;
    let mut awaiting_score = false;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if !seen_first_line {
            seen_first_line = true;
            if let Some(caps) = MATCH_HEADER.captures(line) {
                match_length = caps[1].parse::<u32>().ok();
                continue;
            }
            // No match header: money session, keep going
        }

        if let Some(caps) = GAME_HEADER.captures(line) {
            let number = caps[1]
                .parse::<u32>()
                .map_err(|_| Error::Unparseable("bad game number".to_string()))?;
            games.push(Game {
                number,
                player1: None,
                player2: None,
                starting_score: (0, 0),
                plies: Vec::new(),
                result: None,
            });
            awaiting_score = true;
            continue;
        }

        if awaiting_score {
            awaiting_score = false;
            if let Some(caps) = SCORE_LINE.captures(line) {
                let game = games.last_mut().expect("score row follows a game header");
                game.player1 = Some(caps[1].trim().to_string());
                game.player2 = Some(caps[3].trim().to_string());
                let s1 = caps[2].parse::<u32>().unwrap_or(0);
                let s2 = caps[4].parse::<u32>().unwrap_or(0);
                game.starting_score = (s1, s2);
                continue;
            }
            // Header without a score row: the game keeps null players and
            // the current line falls through to normal handling
        }

        if let Some(caps) = PLY_ROW.captures(line) {
            let number = caps[1]
                .parse::<u32>()
                .map_err(|_| Error::Unparseable("bad ply number".to_string()))?;
            let content = caps.get(2).map(|m| m.as_str()).unwrap_or("");

            let game = games
                .last_mut()
                .ok_or_else(|| Error::Unparseable("ply row before any game header".to_string()))?;

            let mut columns = COLUMN_SPLIT.splitn(content, 2);
            let first = columns.next().unwrap_or("").trim();
            let second = columns.next().map(str::trim);

            let player1 = parse_half_ply(first);
            let player2 = second.map(parse_half_ply).unwrap_or(HalfPly::NoMove);

            if let HalfPly::Win { points } = player1 {
                game.result = Some(GameResult {
                    winner: game.player1.clone(),
                    points,
                    wins_match: false,
                });
            }
            if let HalfPly::Win { points } = player2 {
                game.result = Some(GameResult {
                    winner: game.player2.clone(),
                    points,
                    wins_match: false,
                });
            }

            game.plies.push(Ply {
                number,
                player1,
                player2,
            });
            continue;
        }

        if line.contains("Wins") {
            if let Some(game) = games.last_mut() {
                let (winner, points) = match RESULT_LINE.captures(line) {
                    Some(caps) => {
                        let name = caps[1].trim();
                        (
                            if name.is_empty() { None } else { Some(name.to_string()) },
                            caps[2].parse::<u32>().unwrap_or(0),
                        )
                    }
                    None => (None, 0),
                };
                game.result = Some(GameResult {
                    winner,
                    points,
                    wins_match: line.contains("and the match"),
                });
            }
            continue;
        }

        // Anything else between games (annotations, export chrome) is skipped
    }

    Ok(MatchTranscript {
        match_length,
        games,
    })
}

/// Recognize one half-ply column. Action keywords are case-sensitive.
fn parse_half_ply(text: &str) -> HalfPly {
    if text.is_empty() {
        return HalfPly::NoMove;
    }
    if let Some(caps) = HALF_DOUBLE.captures(text) {
        if let Ok(value) = caps[1].parse::<u32>() {
            return HalfPly::Double { value };
        }
    }
    if text == "Takes" {
        return HalfPly::Take;
    }
    if text == "Drops" {
        return HalfPly::Drop;
    }
    if let Some(caps) = HALF_WIN.captures(text) {
        if let Ok(points) = caps[1].parse::<u32>() {
            return HalfPly::Win { points };
        }
    }
    if let Some(caps) = HALF_MOVE.captures(text) {
        let die1: u8 = caps[1].parse().expect("regex guarantees a digit");
        let die2: u8 = caps[2].parse().expect("regex guarantees a digit");
        let parts = parse_move_tokens(&caps[3]);
        return HalfPly::Move {
            dice: Dice::new(die1, die2),
            parts,
        };
    }
    HalfPly::Unknown {
        text: text.to_string(),
    }
}
