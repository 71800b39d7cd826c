//! Crawl subsystem: source-site client, single-slot job queue, and the
//! crawl-and-analyze pipeline that feeds the quiz store.

pub mod client;
pub mod pipeline;
pub mod queue;

pub use client::{MatchLink, MatchSource, SiteClient};
pub use pipeline::CrawlRunner;
pub use queue::{CrawlJobPayload, CrawlQueue, Credentials, JobRunner};
