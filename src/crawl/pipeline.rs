//! Crawl-and-analyze pipeline
//!
//! One job: log in, list finished matches in the requested window, skip the
//! already-analyzed ones, then download, parse, and analyze each remaining
//! match, persisting every detected mistake as it is found. The match id
//! only joins the analyzed set after its whole match completes, so a crash
//! re-parses at most one match and the content-addressed ids keep the store
//! duplicate-free.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::analyzer::{analyze_transcript, AnalyzeOptions};
use crate::crawl::client::MatchSource;
use crate::crawl::queue::{CrawlDone, CrawlJobPayload, JobRunner};
use crate::db::quizzes;
use crate::engine::MoveEngine;
use crate::error::{Error, Result};
use crate::events::{CrawlEvent, CrawlPhase, CrawlProgress};
use crate::quiz::QuizDoc;
use crate::transcript;

/// Runs the whole crawl for one job
pub struct CrawlRunner {
    db: SqlitePool,
    engine: Arc<dyn MoveEngine>,
    source: Arc<dyn MatchSource>,
    threshold: f64,
}

impl CrawlRunner {
    pub fn new(
        db: SqlitePool,
        engine: Arc<dyn MoveEngine>,
        source: Arc<dyn MatchSource>,
        threshold: f64,
    ) -> Self {
        Self {
            db,
            engine,
            source,
            threshold,
        }
    }
}

#[async_trait]
impl JobRunner for CrawlRunner {
    async fn run(
        &self,
        payload: CrawlJobPayload,
        events: broadcast::Sender<CrawlEvent>,
    ) -> Result<CrawlDone> {
        let user = &payload.storage_key;
        let mut doc = quizzes::load_quizzes(&self.db, user, self.threshold).await?;
        let analyzed = quizzes::load_analyzed_matches(&self.db, user).await?;

        let progress = |phase: CrawlPhase,
                        matches_total: usize,
                        processed: usize,
                        added: usize,
                        last: Option<String>| {
            let _ = events.send(CrawlEvent::Progress(CrawlProgress {
                phase,
                matches_total,
                processed_matches: processed,
                quizzes_added: added,
                last_position_id: last,
            }));
        };

        progress(CrawlPhase::LoginAndList, 0, 0, 0, None);

        let discovered = self
            .source
            .login(&payload.credentials.user, &payload.credentials.password)
            .await?;
        let user_id = payload
            .site_user_id
            .clone()
            .or(discovered)
            .ok_or_else(|| Error::Site("site user id unknown after login".to_string()))?;

        let links = self.source.list_finished(&user_id, payload.days).await?;
        let pending: Vec<_> = links
            .into_iter()
            .filter(|link| !analyzed.contains(&link.match_id))
            .collect();
        let matches_total = pending.len();

        progress(CrawlPhase::FoundLinks, matches_total, 0, 0, None);
        info!(user = %user, matches_total, "crawl listing complete");

        let options = AnalyzeOptions {
            user_name: Some(payload.credentials.user.clone()),
            threshold: self.threshold,
        };

        let mut processed = 0usize;
        let mut added_total = 0usize;
        let mut total = doc.positions.len();
        let mut parse_failures = 0usize;
        let mut last_position_id: Option<String> = None;

        for link in &pending {
            let outcome = async {
                let text = self.source.download(&link.url).await?;
                transcript::parse(&text)
            }
            .await;

            let parsed = match outcome {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(match_id = %link.match_id, error = %e, "match skipped");
                    parse_failures += 1;
                    processed += 1;
                    progress(
                        CrawlPhase::Processing,
                        matches_total,
                        processed,
                        added_total,
                        last_position_id.clone(),
                    );
                    continue;
                }
            };

            let analysis = analyze_transcript(self.engine.as_ref(), &parsed, &options).await?;
            doc.engine_available = doc.engine_available || analysis.engine_available;

            // Fine-grained checkpointing: each record is merged and
            // persisted on its own, keyed by its content-addressed id.
            for record in analysis.records {
                last_position_id = Some(record.gnu_id.clone());
                let saved = quizzes::save_quizzes(
                    &self.db,
                    user,
                    &QuizDoc {
                        engine_available: doc.engine_available,
                        threshold: self.threshold,
                        positions: vec![record],
                    },
                )
                .await?;
                added_total += saved.added;
                total = saved.total;
            }

            quizzes::add_analyzed_match(&self.db, user, &link.match_id, self.threshold).await?;
            processed += 1;
            progress(
                CrawlPhase::Processing,
                matches_total,
                processed,
                added_total,
                last_position_id.clone(),
            );
        }

        if parse_failures > 0 {
            warn!(user = %user, parse_failures, "some matches could not be parsed");
        }

        progress(
            CrawlPhase::Done,
            matches_total,
            processed,
            added_total,
            last_position_id,
        );

        Ok(CrawlDone {
            added: added_total,
            total,
            matches_total,
        })
    }
}
