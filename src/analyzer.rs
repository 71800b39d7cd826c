//! Position analyzer
//!
//! Walks every ply of a parsed match, reconstructs the pre-move board,
//! asks the engine for ranked candidates, and turns plays that lose at
//! least the threshold of equity into quiz records. Cube actions and
//! unparseable half-plies are replayed but never scored.

use std::cmp::Ordering;

use rand::rngs::OsRng;
use rand::Rng;
use tracing::{debug, trace};

use crate::board::{Board, Player};
use crate::engine::{CandidateMove, EngineRequest, MoveEngine};
use crate::error::Result;
use crate::quiz::{quiz_id, MoveChoice, QuizContext, QuizCounters, QuizRecord, UserChoice};
use crate::transcript::{Game, HalfPly, MatchTranscript};
use crate::board::moves::{canonical_key, parts_canonical_key};

/// Analysis parameters
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    /// Only score plies played by this exact name; `None` scores everyone
    pub user_name: Option<String>,
    /// Minimum equity loss for a play to become a quiz
    pub threshold: f64,
}

/// Result of analyzing one match
#[derive(Debug, Clone, Default)]
pub struct AnalysisOutcome {
    /// True when at least one engine invocation produced candidates
    pub engine_available: bool,
    /// Detected mistakes, sorted by equity loss descending
    pub records: Vec<QuizRecord>,
}

/// Analyze every game of a transcript. Per-ply failures skip the ply; the
/// played move is always applied so later plies see the right board.
pub async fn analyze_transcript(
    engine: &dyn MoveEngine,
    transcript: &MatchTranscript,
    options: &AnalyzeOptions,
) -> Result<AnalysisOutcome> {
    let mut outcome = AnalysisOutcome::default();

    for game in &transcript.games {
        analyze_game(engine, transcript, game, options, &mut outcome).await?;
    }

    outcome.records.sort_by(|a, b| {
        b.context
            .equity_diff
            .partial_cmp(&a.context.equity_diff)
            .unwrap_or(Ordering::Equal)
    });
    Ok(outcome)
}

async fn analyze_game(
    engine: &dyn MoveEngine,
    transcript: &MatchTranscript,
    game: &Game,
    options: &AnalyzeOptions,
    outcome: &mut AnalysisOutcome,
) -> Result<()> {
    let mut board = Board::starting();
    board.match_length = transcript.match_length;
    board.score = game.starting_score;

    debug!(
        game = game.number,
        plies = game.plies.len(),
        "analyzing game"
    );

    // A double stays pending until the opponent takes or drops
    let mut pending_double: Option<u32> = None;

    for ply in &game.plies {
        let halves = [
            (Player::One, &ply.player1, game.player1.as_deref()),
            (Player::Two, &ply.player2, game.player2.as_deref()),
        ];
        for (player, half, name) in halves {
            match half {
                HalfPly::Move { dice, parts } => {
                    board.turn = player;
                    board.dice = Some(*dice);

                    if let Some(record) = score_half_ply(
                        engine, &board, *dice, game, ply.number, player, name, parts, options,
                        outcome,
                    )
                    .await?
                    {
                        outcome.records.push(record);
                    }

                    board.apply_move_parts(player, parts);
                }
                HalfPly::Double { value } => {
                    pending_double = Some(*value);
                }
                HalfPly::Take => {
                    if let Some(value) = pending_double.take() {
                        board.accept_double(player, value);
                    }
                }
                HalfPly::Drop => {
                    pending_double = None;
                }
                HalfPly::Win { .. } | HalfPly::NoMove | HalfPly::Unknown { .. } => {}
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn score_half_ply(
    engine: &dyn MoveEngine,
    board: &Board,
    dice: crate::board::Dice,
    game: &Game,
    ply_number: u32,
    player: Player,
    name: Option<&str>,
    parts: &[crate::board::moves::MovePart],
    options: &AnalyzeOptions,
    outcome: &mut AnalysisOutcome,
) -> Result<Option<QuizRecord>> {
    // A record needs a user identity; anonymous games are replayed only
    let Some(name) = name else {
        return Ok(None);
    };
    if let Some(filter) = &options.user_name {
        if filter != name {
            return Ok(None);
        }
    }

    let gnu_id = board.to_gnu_id();
    let request = EngineRequest::for_position(&gnu_id, Some(dice));

    let analysis = engine.analyze(&request).await?;
    if !analysis.engine_available || analysis.moves.is_empty() {
        trace!(game = game.number, ply = ply_number, "engine unavailable, skipping");
        return Ok(None);
    }
    outcome.engine_available = true;

    let played_key = parts_canonical_key(parts);
    let Some(rank) = analysis
        .moves
        .iter()
        .position(|c| canonical_key(&c.move_text) == played_key)
    else {
        debug!(
            game = game.number,
            ply = ply_number,
            player = player.tag(),
            "played move not among engine candidates"
        );
        return Ok(None);
    };

    let (Some(best_value), Some(user_value)) = (
        analysis.moves[0].ranking_value(),
        analysis.moves[rank].ranking_value(),
    ) else {
        return Ok(None);
    };

    let equity_diff = best_value - user_value;
    if equity_diff < options.threshold {
        return Ok(None);
    }

    let higher_sample = sample_higher(&analysis.moves, rank);
    let lower_sample = sample_lower(&analysis.moves, rank);

    debug!(
        game = game.number,
        ply = ply_number,
        player = player.tag(),
        rank,
        equity_diff,
        "mistake detected"
    );

    Ok(Some(QuizRecord {
        id: quiz_id(&gnu_id, player, game.number, ply_number, name),
        kind: "move".to_string(),
        gnu_id,
        best: MoveChoice {
            move_text: analysis.moves[0].move_text.clone(),
            equity: best_value,
        },
        user: UserChoice {
            name: name.to_string(),
            move_text: analysis.moves[rank].move_text.clone(),
            equity: user_value,
            rank,
        },
        higher_sample,
        lower_sample,
        context: QuizContext {
            game_number: game.number,
            ply_index: ply_number,
            player,
            dice,
            equity_diff,
        },
        quiz: QuizCounters::default(),
    }))
}

/// Pick the "one better" distractor. When the user played the second-best
/// move the only strictly better candidate is the best itself, so the
/// next-ranked move stands in; otherwise sample uniformly among the
/// strictly better candidates.
fn sample_higher(moves: &[CandidateMove], rank: usize) -> Option<MoveChoice> {
    let index = match rank {
        0 => return None,
        1 => 2,
        _ => OsRng.gen_range(0..rank),
    };
    choice_at(moves, index)
}

/// Pick the "one worse" distractor from the window just below the user's
/// rank.
fn sample_lower(moves: &[CandidateMove], rank: usize) -> Option<MoveChoice> {
    let low = rank + 1;
    if low >= moves.len() {
        return None;
    }
    let high = (rank + 2).min(moves.len() - 1);
    let index = if high > low {
        OsRng.gen_range(low..=high)
    } else {
        low
    };
    choice_at(moves, index)
}

fn choice_at(moves: &[CandidateMove], index: usize) -> Option<MoveChoice> {
    let candidate = moves.get(index)?;
    let equity = candidate.ranking_value()?;
    Some(MoveChoice {
        move_text: candidate.move_text.clone(),
        equity,
    })
}
