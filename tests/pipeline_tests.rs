//! End-to-end crawl pipeline tests over stub collaborators
//!
//! The engine and the source site are replaced by stubs; the store is a
//! real in-memory SQLite database, so these exercise the same
//! merge-on-write and analyzed-match bookkeeping as production.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use gammon_quiz::crawl::queue::{CrawlJobPayload, Credentials, JobRunner};
use gammon_quiz::crawl::{CrawlRunner, MatchLink, MatchSource};
use gammon_quiz::db::init::memory_pool;
use gammon_quiz::db::quizzes;
use gammon_quiz::engine::{CandidateMove, EngineAnalysis, EngineRequest, MoveEngine};
use gammon_quiz::error::Result;
use gammon_quiz::events::{CrawlEvent, CrawlPhase};

const TRANSCRIPT: &str = "\
 7 point match

 Game 1
 alice : 0                              bob : 0
  1) 53: 8/3 8/5                        62: 24/18 13/11
  2) 31: 8/5 6/5                        44: 13/9 13/9 24/20 24/20
";

struct StubEngine {
    moves: Vec<CandidateMove>,
}

impl StubEngine {
    fn new() -> Arc<Self> {
        let ranking = [
            ("8/3 6/3", 0.087),
            ("24/19 13/10", 0.061),
            ("24/19 24/21", 0.034),
            ("13/8 13/10", 0.021),
            ("13/8 6/3", 0.010),
            ("24/21 13/8", -0.004),
            ("13/10 13/8", -0.019),
            ("24/16", -0.101),
            ("13/5", -0.188),
            ("8/3 8/5", -0.290),
            ("6/1 13/10", -0.310),
        ];
        Arc::new(Self {
            moves: ranking
                .into_iter()
                .map(|(text, eq)| CandidateMove::normalized(text, Some(eq), None))
                .collect(),
        })
    }
}

#[async_trait]
impl MoveEngine for StubEngine {
    async fn analyze(&self, _request: &EngineRequest) -> Result<EngineAnalysis> {
        Ok(EngineAnalysis {
            engine_available: true,
            moves: self.moves.clone(),
            raw: None,
        })
    }
}

/// Source stub serving the same transcript under configurable match ids
struct StubSource {
    match_ids: Vec<String>,
}

#[async_trait]
impl MatchSource for StubSource {
    async fn login(&self, _user: &str, _password: &str) -> Result<Option<String>> {
        Ok(Some("42".to_string()))
    }

    async fn list_finished(&self, _user_id: &str, _days: u32) -> Result<Vec<MatchLink>> {
        Ok(self
            .match_ids
            .iter()
            .map(|id| MatchLink {
                match_id: id.clone(),
                url: format!("/bg/export/{}", id),
            })
            .collect())
    }

    async fn download(&self, _url: &str) -> Result<String> {
        Ok(TRANSCRIPT.to_string())
    }
}

fn payload() -> CrawlJobPayload {
    CrawlJobPayload {
        storage_key: "alice".to_string(),
        credentials: Credentials {
            user: "alice".to_string(),
            password: "secret".to_string(),
        },
        days: 30,
        site_user_id: None,
    }
}

fn drain(rx: &mut broadcast::Receiver<CrawlEvent>) -> Vec<CrawlEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn crawl_detects_mistakes_and_streams_progress() {
    let db = memory_pool().await.unwrap();
    let runner = CrawlRunner::new(
        db.clone(),
        StubEngine::new(),
        Arc::new(StubSource {
            match_ids: vec!["4711".to_string()],
        }),
        0.08,
    );

    let (tx, mut rx) = broadcast::channel(64);
    let done = runner.run(payload(), tx).await.unwrap();

    // alice played "8/3 8/5" (rank 9, diff 0.377) in ply 1; her other play
    // is not in the stub ranking and is skipped.
    assert_eq!(done.added, 1);
    assert_eq!(done.total, 1);
    assert_eq!(done.matches_total, 1);

    let doc = quizzes::load_quizzes(&db, "alice", 0.08).await.unwrap();
    assert!(doc.engine_available);
    assert_eq!(doc.positions.len(), 1);
    let record = &doc.positions[0];
    assert_eq!(record.user.name, "alice");
    assert_eq!(record.user.rank, 9);
    assert!((record.context.equity_diff - 0.377).abs() < 1e-9);

    // Only alice's plies are analyzed; bob's mistakes are not recorded
    assert!(doc.positions.iter().all(|p| p.user.name == "alice"));

    let phases: Vec<CrawlPhase> = drain(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            CrawlEvent::Progress(p) => Some(p.phase),
            _ => None,
        })
        .collect();
    assert_eq!(phases.first(), Some(&CrawlPhase::LoginAndList));
    assert!(phases.contains(&CrawlPhase::FoundLinks));
    assert!(phases.contains(&CrawlPhase::Processing));
    assert_eq!(phases.last(), Some(&CrawlPhase::Done));

    let matches = quizzes::load_analyzed_matches(&db, "alice").await.unwrap();
    assert!(matches.contains("4711"));
}

#[tokio::test]
async fn second_crawl_over_the_same_match_adds_nothing() {
    let db = memory_pool().await.unwrap();
    let engine = StubEngine::new();
    let source = Arc::new(StubSource {
        match_ids: vec!["4711".to_string()],
    });

    let runner = CrawlRunner::new(db.clone(), engine.clone(), source.clone(), 0.08);

    let (tx, _rx) = broadcast::channel(64);
    let first = runner.run(payload(), tx.clone()).await.unwrap();
    assert!(first.added > 0);

    let second = runner.run(payload(), tx).await.unwrap();
    assert_eq!(second.added, 0);

    let doc = quizzes::load_quizzes(&db, "alice", 0.08).await.unwrap();
    assert_eq!(doc.positions.len(), first.added);
}

#[tokio::test]
async fn reanalysis_under_a_new_match_id_is_deduplicated_by_record_id() {
    // A crash between record-save and analyzed-match-save means the same
    // positions get re-analyzed; the content-addressed ids keep the store
    // duplicate-free even then.
    let db = memory_pool().await.unwrap();
    let engine = StubEngine::new();

    let first_pass = CrawlRunner::new(
        db.clone(),
        engine.clone(),
        Arc::new(StubSource {
            match_ids: vec!["4711".to_string()],
        }),
        0.08,
    );
    let (tx, _rx) = broadcast::channel(64);
    let first = first_pass.run(payload(), tx.clone()).await.unwrap();
    assert_eq!(first.added, 1);

    // Same transcript resurfacing under a fresh match id
    let second_pass = CrawlRunner::new(
        db.clone(),
        engine,
        Arc::new(StubSource {
            match_ids: vec!["9999".to_string()],
        }),
        0.08,
    );
    let second = second_pass.run(payload(), tx).await.unwrap();
    assert_eq!(second.added, 0);
    assert_eq!(second.total, 1);

    let doc = quizzes::load_quizzes(&db, "alice", 0.08).await.unwrap();
    assert_eq!(doc.positions.len(), 1);
}

#[tokio::test]
async fn counters_survive_a_recrawl() {
    let db = memory_pool().await.unwrap();
    let engine = StubEngine::new();
    let source = Arc::new(StubSource {
        match_ids: vec!["4711".to_string()],
    });

    let runner = CrawlRunner::new(db.clone(), engine.clone(), source.clone(), 0.08);
    let (tx, _rx) = broadcast::channel(64);
    runner.run(payload(), tx.clone()).await.unwrap();

    let doc = quizzes::load_quizzes(&db, "alice", 0.08).await.unwrap();
    let id = doc.positions[0].id.clone();
    quizzes::record_quiz_result(&db, "alice", &id, true)
        .await
        .unwrap()
        .unwrap();

    // Re-crawl under a new match id; the merged record keeps its counters
    let second_pass = CrawlRunner::new(
        db.clone(),
        engine,
        Arc::new(StubSource {
            match_ids: vec!["9999".to_string()],
        }),
        0.08,
    );
    second_pass.run(payload(), tx).await.unwrap();

    let record = quizzes::get_quiz_by_id(&db, "alice", &id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.quiz.play_count, 1);
    assert_eq!(record.quiz.correct_answers, 1);
}

#[tokio::test]
async fn unparseable_matches_are_skipped_and_marked() {
    struct BrokenSource;

    #[async_trait]
    impl MatchSource for BrokenSource {
        async fn login(&self, _user: &str, _password: &str) -> Result<Option<String>> {
            Ok(Some("42".to_string()))
        }
        async fn list_finished(&self, _user_id: &str, _days: u32) -> Result<Vec<MatchLink>> {
            Ok(vec![MatchLink {
                match_id: "13".to_string(),
                url: "/bg/export/13".to_string(),
            }])
        }
        async fn download(&self, _url: &str) -> Result<String> {
            // A ply row before any game header is a structural failure
            Ok(" 5 point match\n  1) 31: 8/5 6/5\n".to_string())
        }
    }

    let db = memory_pool().await.unwrap();
    let runner = CrawlRunner::new(db.clone(), StubEngine::new(), Arc::new(BrokenSource), 0.08);

    let (tx, _rx) = broadcast::channel(64);
    let done = runner.run(payload(), tx).await.unwrap();
    assert_eq!(done.added, 0);
    assert_eq!(done.matches_total, 1);

    // The broken match is not marked analyzed, so a fixed export would be
    // retried on the next crawl
    let matches = quizzes::load_analyzed_matches(&db, "alice").await.unwrap();
    assert!(!matches.contains("13"));
}
