//! Per-user quiz store
//!
//! The gateway for both documents of a user row. Saves merge instead of
//! overwrite: positions are keyed by their content-addressed id, so
//! re-analyzing a match never duplicates a quiz, and exposure counters
//! survive a re-crawl.

use serde::Serialize;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;

use crate::error::Result;
use crate::quiz::{AnalyzedMatches, QuizDoc, QuizRecord};

/// Storage key normalization: usernames are trimmed and lowercased.
pub fn normalize_username(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Outcome of a merge-on-write save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Positions that were new to the store
    pub added: usize,
    /// Positions in the document after the merge
    pub total: usize,
}

/// Aggregate answer statistics for one user
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_quizzes: usize,
    pub total_attempts: u64,
    pub total_correct: u64,
    /// Up to three positions with the worst answer ratio
    pub worst_quizzes: Vec<QuizRecord>,
}

/// Create the user row on first touch with empty documents.
async fn ensure_user(
    tx: &mut Transaction<'_, Sqlite>,
    username: &str,
    threshold: f64,
) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO users (username, quizzes, analyzed_matches) VALUES (?, ?, ?)")
        .bind(username)
        .bind(serde_json::to_string(&QuizDoc::empty(threshold))?)
        .bind(serde_json::to_string(&AnalyzedMatches::default())?)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn read_quiz_doc(
    tx: &mut Transaction<'_, Sqlite>,
    username: &str,
) -> Result<Option<QuizDoc>> {
    let body: Option<String> = sqlx::query_scalar("SELECT quizzes FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(&mut **tx)
        .await?;
    match body {
        Some(body) => Ok(Some(serde_json::from_str(&body)?)),
        None => Ok(None),
    }
}

async fn write_quiz_doc(
    tx: &mut Transaction<'_, Sqlite>,
    username: &str,
    doc: &QuizDoc,
) -> Result<()> {
    sqlx::query("UPDATE users SET quizzes = ?, updated_at = CURRENT_TIMESTAMP WHERE username = ?")
        .bind(serde_json::to_string(doc)?)
        .bind(username)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Load a user's quiz document, creating it with defaults on first touch.
pub async fn load_quizzes(db: &SqlitePool, username: &str, threshold: f64) -> Result<QuizDoc> {
    let username = normalize_username(username);
    let mut tx = db.begin().await?;
    ensure_user(&mut tx, &username, threshold).await?;
    let doc = read_quiz_doc(&mut tx, &username)
        .await?
        .unwrap_or_else(|| QuizDoc::empty(threshold));
    tx.commit().await?;
    Ok(doc)
}

/// Merge `incoming` into the stored document inside one transaction.
///
/// Collisions on `id` keep `playCount = max(a, b)` and clamp
/// `correctAnswers` to the merged play count. Threshold and engine
/// availability take the incoming values.
pub async fn save_quizzes(
    db: &SqlitePool,
    username: &str,
    incoming: &QuizDoc,
) -> Result<SaveOutcome> {
    let username = normalize_username(username);
    let mut tx = db.begin().await?;
    ensure_user(&mut tx, &username, incoming.threshold).await?;

    let mut existing = read_quiz_doc(&mut tx, &username)
        .await?
        .unwrap_or_else(|| QuizDoc::empty(incoming.threshold));

    let mut added = 0usize;
    for position in &incoming.positions {
        match existing.positions.iter_mut().find(|p| p.id == position.id) {
            Some(stored) => {
                let play_count = stored.quiz.play_count.max(position.quiz.play_count);
                let correct = stored
                    .quiz
                    .correct_answers
                    .max(position.quiz.correct_answers)
                    .min(play_count);
                stored.quiz.play_count = play_count;
                stored.quiz.correct_answers = correct;
            }
            None => {
                existing.positions.push(position.clone());
                added += 1;
            }
        }
    }
    existing.threshold = incoming.threshold;
    existing.engine_available = incoming.engine_available;

    write_quiz_doc(&mut tx, &username, &existing).await?;
    tx.commit().await?;

    debug!(user = %username, added, total = existing.positions.len(), "quizzes saved");
    Ok(SaveOutcome {
        added,
        total: existing.positions.len(),
    })
}

/// Record one answer: `playCount` always increments, `correctAnswers` only
/// for a correct answer, clamped to the play count. Unknown ids are a
/// no-op returning `None`.
pub async fn record_quiz_result(
    db: &SqlitePool,
    username: &str,
    id: &str,
    was_correct: bool,
) -> Result<Option<QuizRecord>> {
    let username = normalize_username(username);
    let mut tx = db.begin().await?;

    let Some(mut doc) = read_quiz_doc(&mut tx, &username).await? else {
        tx.commit().await?;
        return Ok(None);
    };

    let Some(record) = doc.positions.iter_mut().find(|p| p.id == id) else {
        tx.commit().await?;
        return Ok(None);
    };

    record.quiz.play_count += 1;
    if was_correct {
        record.quiz.correct_answers = (record.quiz.correct_answers + 1).min(record.quiz.play_count);
    }
    let updated = record.clone();

    write_quiz_doc(&mut tx, &username, &doc).await?;
    tx.commit().await?;
    Ok(Some(updated))
}

/// Load the analyzed-match set for a user.
pub async fn load_analyzed_matches(db: &SqlitePool, username: &str) -> Result<AnalyzedMatches> {
    let username = normalize_username(username);
    let body: Option<String> =
        sqlx::query_scalar("SELECT analyzed_matches FROM users WHERE username = ?")
            .bind(&username)
            .fetch_optional(db)
            .await?;
    match body {
        Some(body) => Ok(serde_json::from_str(&body)?),
        None => Ok(AnalyzedMatches::default()),
    }
}

/// Union one match id into the analyzed set and persist immediately, so a
/// crash mid-crawl does not re-analyze finished matches.
pub async fn add_analyzed_match(
    db: &SqlitePool,
    username: &str,
    match_id: &str,
    threshold: f64,
) -> Result<()> {
    let username = normalize_username(username);
    let mut tx = db.begin().await?;
    ensure_user(&mut tx, &username, threshold).await?;

    let body: Option<String> =
        sqlx::query_scalar("SELECT analyzed_matches FROM users WHERE username = ?")
            .bind(&username)
            .fetch_optional(&mut *tx)
            .await?;
    let mut set: AnalyzedMatches = match body {
        Some(body) => serde_json::from_str(&body)?,
        None => AnalyzedMatches::default(),
    };
    set.insert(match_id);

    sqlx::query("UPDATE users SET analyzed_matches = ?, updated_at = CURRENT_TIMESTAMP WHERE username = ?")
        .bind(serde_json::to_string(&set)?)
        .bind(&username)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Priority of a position: severity discounted by past exposure.
pub fn priority_score(record: &QuizRecord) -> f64 {
    let correct = record.quiz.correct_answers as f64;
    let plays = record.quiz.play_count as f64;
    record.context.equity_diff / (1.0 + 10.0 * correct * correct + 2.0 * plays)
}

/// Pick the next quiz for a user: the position maximizing
/// `equityDiff / (1 + 10·correctAnswers² + 2·playCount)`, optionally
/// restricted to an exact player name. Ties keep the first occurrence.
pub async fn next_quiz(
    db: &SqlitePool,
    username: &str,
    player: Option<&str>,
) -> Result<Option<QuizRecord>> {
    let username = normalize_username(username);
    let body: Option<String> = sqlx::query_scalar("SELECT quizzes FROM users WHERE username = ?")
        .bind(&username)
        .fetch_optional(db)
        .await?;
    let Some(body) = body else {
        return Ok(None);
    };
    let doc: QuizDoc = serde_json::from_str(&body)?;

    let mut best: Option<&QuizRecord> = None;
    let mut best_score = f64::NEG_INFINITY;
    for record in doc.positions.iter() {
        if let Some(player) = player {
            if record.user.name != player {
                continue;
            }
        }
        let score = priority_score(record);
        if score > best_score {
            best_score = score;
            best = Some(record);
        }
    }
    Ok(best.cloned())
}

/// Fetch one quiz by id.
pub async fn get_quiz_by_id(
    db: &SqlitePool,
    username: &str,
    id: &str,
) -> Result<Option<QuizRecord>> {
    let username = normalize_username(username);
    let body: Option<String> = sqlx::query_scalar("SELECT quizzes FROM users WHERE username = ?")
        .bind(&username)
        .fetch_optional(db)
        .await?;
    let Some(body) = body else {
        return Ok(None);
    };
    let doc: QuizDoc = serde_json::from_str(&body)?;
    Ok(doc.positions.into_iter().find(|p| p.id == id))
}

/// Sorted unique player names seen across every stored document.
pub async fn list_players(db: &SqlitePool) -> Result<Vec<String>> {
    let bodies: Vec<String> = sqlx::query_scalar("SELECT quizzes FROM users")
        .fetch_all(db)
        .await?;

    let mut names: Vec<String> = Vec::new();
    for body in bodies {
        let doc: QuizDoc = serde_json::from_str(&body)?;
        for position in doc.positions {
            names.push(position.user.name);
        }
    }
    names.sort();
    names.dedup();
    Ok(names)
}

/// Aggregate statistics for one user: totals plus the three positions with
/// the lowest answer ratio among those actually played (ties prefer the
/// higher play count).
pub async fn statistics(db: &SqlitePool, username: &str) -> Result<Statistics> {
    let username = normalize_username(username);
    let body: Option<String> = sqlx::query_scalar("SELECT quizzes FROM users WHERE username = ?")
        .bind(&username)
        .fetch_optional(db)
        .await?;
    let doc: QuizDoc = match body {
        Some(body) => serde_json::from_str(&body)?,
        None => QuizDoc::empty(0.0),
    };

    let total_quizzes = doc.positions.len();
    let total_attempts: u64 = doc.positions.iter().map(|p| p.quiz.play_count as u64).sum();
    let total_correct: u64 = doc
        .positions
        .iter()
        .map(|p| p.quiz.correct_answers as u64)
        .sum();

    let mut played: Vec<&QuizRecord> = doc
        .positions
        .iter()
        .filter(|p| p.quiz.play_count > 0)
        .collect();
    played.sort_by(|a, b| {
        let ratio_a = a.quiz.correct_answers as f64 / a.quiz.play_count as f64;
        let ratio_b = b.quiz.correct_answers as f64 / b.quiz.play_count as f64;
        ratio_a
            .partial_cmp(&ratio_b)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.quiz.play_count.cmp(&a.quiz.play_count))
    });

    Ok(Statistics {
        total_quizzes,
        total_attempts,
        total_correct,
        worst_quizzes: played.into_iter().take(3).cloned().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Dice, Player};
    use crate::db::init::memory_pool;
    use crate::quiz::{MoveChoice, QuizContext, QuizCounters, UserChoice};

    fn record(id: &str, equity_diff: f64, play_count: u32, correct: u32) -> QuizRecord {
        QuizRecord {
            id: id.to_string(),
            kind: "move".to_string(),
            gnu_id: "POS:MATCH".to_string(),
            best: MoveChoice {
                move_text: "8/3 6/3".to_string(),
                equity: 0.1,
            },
            user: UserChoice {
                name: "alice".to_string(),
                move_text: "8/3 8/5".to_string(),
                equity: 0.1 - equity_diff,
                rank: 4,
            },
            higher_sample: None,
            lower_sample: None,
            context: QuizContext {
                game_number: 1,
                ply_index: 1,
                player: Player::One,
                dice: Dice::new(5, 3),
                equity_diff,
            },
            quiz: QuizCounters {
                play_count,
                correct_answers: correct,
            },
        }
    }

    fn doc(positions: Vec<QuizRecord>) -> QuizDoc {
        QuizDoc {
            engine_available: true,
            threshold: 0.08,
            positions,
        }
    }

    #[test]
    fn username_normalization_trims_and_lowercases() {
        assert_eq!(normalize_username("  Alice "), "alice");
    }

    #[tokio::test]
    async fn save_merges_by_id() {
        let db = memory_pool().await.unwrap();

        let first = save_quizzes(&db, "alice", &doc(vec![record("a", 0.3, 0, 0)]))
            .await
            .unwrap();
        assert_eq!(first, SaveOutcome { added: 1, total: 1 });

        // Same id again plus one new: only the new one counts as added
        let second = save_quizzes(
            &db,
            "alice",
            &doc(vec![record("a", 0.3, 2, 1), record("b", 0.5, 0, 0)]),
        )
        .await
        .unwrap();
        assert_eq!(second, SaveOutcome { added: 1, total: 2 });

        let stored = load_quizzes(&db, "alice", 0.08).await.unwrap();
        let merged = stored.positions.iter().find(|p| p.id == "a").unwrap();
        assert_eq!(merged.quiz.play_count, 2);
        assert_eq!(merged.quiz.correct_answers, 1);
    }

    #[tokio::test]
    async fn merge_clamps_correct_answers_to_play_count() {
        let db = memory_pool().await.unwrap();
        save_quizzes(&db, "alice", &doc(vec![record("a", 0.3, 1, 1)]))
            .await
            .unwrap();
        save_quizzes(&db, "alice", &doc(vec![record("a", 0.3, 0, 3)]))
            .await
            .unwrap();

        let stored = load_quizzes(&db, "alice", 0.08).await.unwrap();
        let merged = &stored.positions[0];
        assert_eq!(merged.quiz.play_count, 1);
        assert_eq!(merged.quiz.correct_answers, 1);
        assert!(merged.quiz.correct_answers <= merged.quiz.play_count);
    }

    #[tokio::test]
    async fn record_result_increments_and_clamps() {
        let db = memory_pool().await.unwrap();
        save_quizzes(&db, "alice", &doc(vec![record("a", 0.3, 0, 0)]))
            .await
            .unwrap();

        let updated = record_quiz_result(&db, "alice", "a", true).await.unwrap().unwrap();
        assert_eq!(updated.quiz.play_count, 1);
        assert_eq!(updated.quiz.correct_answers, 1);

        let updated = record_quiz_result(&db, "alice", "a", false).await.unwrap().unwrap();
        assert_eq!(updated.quiz.play_count, 2);
        assert_eq!(updated.quiz.correct_answers, 1);

        // Unknown id is a no-op
        assert!(record_quiz_result(&db, "alice", "zzz", true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn next_quiz_prefers_untouched_severity() {
        let db = memory_pool().await.unwrap();
        // A: diff 0.3 never played -> 0.30; B: diff 0.5 played twice,
        // both correct -> 0.5 / 45 ~= 0.011
        save_quizzes(
            &db,
            "alice",
            &doc(vec![record("a", 0.3, 0, 0), record("b", 0.5, 2, 2)]),
        )
        .await
        .unwrap();

        let next = next_quiz(&db, "alice", None).await.unwrap().unwrap();
        assert_eq!(next.id, "a");
    }

    #[tokio::test]
    async fn next_quiz_filters_by_player_name() {
        let db = memory_pool().await.unwrap();
        let mut other = record("b", 0.9, 0, 0);
        other.user.name = "bob".to_string();
        save_quizzes(&db, "alice", &doc(vec![record("a", 0.3, 0, 0), other]))
            .await
            .unwrap();

        let next = next_quiz(&db, "alice", Some("alice")).await.unwrap().unwrap();
        assert_eq!(next.id, "a");
        assert!(next_quiz(&db, "alice", Some("nobody")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn analyzed_matches_survive_reloads() {
        let db = memory_pool().await.unwrap();
        add_analyzed_match(&db, "alice", "4711", 0.08).await.unwrap();
        add_analyzed_match(&db, "alice", "1234", 0.08).await.unwrap();
        add_analyzed_match(&db, "alice", "4711", 0.08).await.unwrap();

        let set = load_analyzed_matches(&db, "alice").await.unwrap();
        assert_eq!(set.matches, vec!["1234", "4711"]);
    }

    #[tokio::test]
    async fn statistics_report_totals_and_worst() {
        let db = memory_pool().await.unwrap();
        save_quizzes(
            &db,
            "alice",
            &doc(vec![
                record("a", 0.3, 4, 1), // ratio 0.25
                record("b", 0.2, 2, 2), // ratio 1.0
                record("c", 0.4, 0, 0), // never played
                record("d", 0.1, 4, 0), // ratio 0.0
            ]),
        )
        .await
        .unwrap();

        let stats = statistics(&db, "alice").await.unwrap();
        assert_eq!(stats.total_quizzes, 4);
        assert_eq!(stats.total_attempts, 10);
        assert_eq!(stats.total_correct, 3);
        assert_eq!(stats.worst_quizzes.len(), 3);
        assert_eq!(stats.worst_quizzes[0].id, "d");
        assert_eq!(stats.worst_quizzes[1].id, "a");
        assert_eq!(stats.worst_quizzes[2].id, "b");
    }

    #[tokio::test]
    async fn players_are_sorted_and_unique() {
        let db = memory_pool().await.unwrap();
        let mut bob = record("b", 0.2, 0, 0);
        bob.user.name = "bob".to_string();
        save_quizzes(&db, "alice", &doc(vec![record("a", 0.3, 0, 0), bob]))
            .await
            .unwrap();
        let mut carol = record("c", 0.2, 0, 0);
        carol.user.name = "carol".to_string();
        save_quizzes(&db, "carol", &doc(vec![carol])).await.unwrap();

        let players = list_players(&db).await.unwrap();
        assert_eq!(players, vec!["alice", "bob", "carol"]);
    }
}
