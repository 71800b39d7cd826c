//! Crawl progress events
//!
//! Everything the crawl pipeline tells its listeners flows through
//! `CrawlEvent`. The SSE layer uses `event_type()` as the event name and the
//! serialized variant as the payload.

use serde::Serialize;

/// Pipeline phase reported in progress events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlPhase {
    LoginAndList,
    FoundLinks,
    Processing,
    Done,
}

/// Progress snapshot for a running crawl
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlProgress {
    pub phase: CrawlPhase,
    pub matches_total: usize,
    pub processed_matches: usize,
    pub quizzes_added: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_position_id: Option<String>,
}

/// Event stream of one crawl job. `Done` and `Error` are terminal.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CrawlEvent {
    #[serde(rename_all = "camelCase")]
    Queue { ahead_count: usize },
    Progress(CrawlProgress),
    #[serde(rename_all = "camelCase")]
    Done {
        added: usize,
        total: usize,
        matches_total: usize,
    },
    Error { error: String },
}

impl CrawlEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            CrawlEvent::Queue { .. } => "queue",
            CrawlEvent::Progress(_) => "progress",
            CrawlEvent::Done { .. } => "done",
            CrawlEvent::Error { .. } => "error",
        }
    }

    /// True for events that close the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, CrawlEvent::Done { .. } | CrawlEvent::Error { .. })
    }
}
