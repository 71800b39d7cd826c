//! Single-slot crawl job queue
//!
//! At most one crawl runs at any instant across all users because the
//! engine process is not safe to run in parallel. Jobs are FIFO; every job
//! owns a broadcast channel its listeners subscribe to, and the queue
//! re-broadcasts ahead-counts whenever it advances. Terminal states are
//! retained so a listener attaching late still gets the outcome.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::Result;
use crate::events::CrawlEvent;

/// Source-site credentials carried by a job. No `Debug` derive; the
/// password must never reach the logs.
#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// What a crawl job needs to run
#[derive(Clone)]
pub struct CrawlJobPayload {
    /// Normalized username keying the per-user store
    pub storage_key: String,
    pub credentials: Credentials,
    /// Day window for the finished-match listing
    pub days: u32,
    /// Site-side numeric user id; discovered at login when absent
    pub site_user_id: Option<String>,
}

/// Final tallies of a successful crawl
#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlDone {
    /// Quiz positions added by this crawl
    pub added: usize,
    /// Positions in the user's store afterwards
    pub total: usize,
    /// Matches the listing produced (before the analyzed filter)
    pub matches_total: usize,
}

/// The work a job performs; the queue stays ignorant of crawling.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(
        &self,
        payload: CrawlJobPayload,
        events: broadcast::Sender<CrawlEvent>,
    ) -> Result<CrawlDone>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
}

struct Job {
    status: JobStatus,
    payload: Option<CrawlJobPayload>,
    tx: broadcast::Sender<CrawlEvent>,
    final_event: Option<CrawlEvent>,
}

struct Inner {
    jobs: HashMap<Uuid, Job>,
    order: VecDeque<Uuid>,
    running: Option<Uuid>,
}

/// FIFO queue feeding the one engine process. Cloning yields another
/// handle onto the same queue.
#[derive(Clone)]
pub struct CrawlQueue {
    runner: Arc<dyn JobRunner>,
    inner: Arc<Mutex<Inner>>,
}

/// Broadcast capacity per job; progress events are small and listeners
/// that lag simply miss intermediate snapshots.
const EVENT_CAPACITY: usize = 64;

impl CrawlQueue {
    pub fn new(runner: Arc<dyn JobRunner>) -> Self {
        Self {
            runner,
            inner: Arc::new(Mutex::new(Inner {
                jobs: HashMap::new(),
                order: VecDeque::new(),
                running: None,
            })),
        }
    }

    /// Append a job. Returns its id and how many jobs run before it.
    pub fn submit(&self, payload: CrawlJobPayload) -> (Uuid, usize) {
        let id = Uuid::new_v4();
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);

        let ahead_count;
        {
            let mut inner = self.inner.lock().expect("queue mutex");
            ahead_count = inner.order.len() + usize::from(inner.running.is_some());
            inner.jobs.insert(
                id,
                Job {
                    status: JobStatus::Queued,
                    payload: Some(payload),
                    tx,
                    final_event: None,
                },
            );
            inner.order.push_back(id);
            broadcast_ahead_counts(&inner);
        }
        info!(job = %id, ahead_count, "crawl job queued");

        self.maybe_start();
        (id, ahead_count)
    }

    /// Attach to a job: the current state is returned synchronously, the
    /// receiver carries further events. The receiver is `None` once the job
    /// is terminal.
    pub fn subscribe(
        &self,
        id: Uuid,
    ) -> Option<(CrawlEvent, Option<broadcast::Receiver<CrawlEvent>>)> {
        let inner = self.inner.lock().expect("queue mutex");
        let job = inner.jobs.get(&id)?;
        match job.status {
            JobStatus::Queued => {
                let position = inner.order.iter().position(|j| *j == id).unwrap_or(0);
                let ahead_count = position + usize::from(inner.running.is_some());
                Some((CrawlEvent::Queue { ahead_count }, Some(job.tx.subscribe())))
            }
            JobStatus::Running => {
                Some((CrawlEvent::Queue { ahead_count: 0 }, Some(job.tx.subscribe())))
            }
            JobStatus::Done | JobStatus::Error => {
                let event = job
                    .final_event
                    .clone()
                    .unwrap_or(CrawlEvent::Error {
                        error: "job finished without a result".to_string(),
                    });
                Some((event, None))
            }
        }
    }

    /// Start the next job if the slot is free.
    fn maybe_start(&self) {
        let (id, payload, tx) = {
            let mut inner = self.inner.lock().expect("queue mutex");
            if inner.running.is_some() {
                return;
            }
            let Some(id) = inner.order.pop_front() else {
                return;
            };
            inner.running = Some(id);
            let job = inner.jobs.get_mut(&id).expect("queued job exists");
            job.status = JobStatus::Running;
            let payload = job.payload.take().expect("queued job has a payload");
            let tx = job.tx.clone();
            broadcast_ahead_counts(&inner);
            (id, payload, tx)
        };

        let queue = self.clone();
        tokio::spawn(async move {
            let _ = tx.send(CrawlEvent::Queue { ahead_count: 0 });
            info!(job = %id, "crawl job started");

            let final_event = match queue.runner.run(payload, tx.clone()).await {
                Ok(done) => {
                    info!(job = %id, added = done.added, "crawl job finished");
                    CrawlEvent::Done {
                        added: done.added,
                        total: done.total,
                        matches_total: done.matches_total,
                    }
                }
                Err(e) => {
                    error!(job = %id, error = %e, "crawl job failed");
                    CrawlEvent::Error {
                        error: e.to_string(),
                    }
                }
            };

            {
                let mut inner = queue.inner.lock().expect("queue mutex");
                if let Some(job) = inner.jobs.get_mut(&id) {
                    job.status = if matches!(final_event, CrawlEvent::Done { .. }) {
                        JobStatus::Done
                    } else {
                        JobStatus::Error
                    };
                    job.final_event = Some(final_event.clone());
                }
                inner.running = None;
            }
            let _ = tx.send(final_event);

            queue.maybe_start();
        });
    }
}

/// Tell every queued job how many jobs still run before it.
fn broadcast_ahead_counts(inner: &Inner) {
    let offset = usize::from(inner.running.is_some());
    for (position, id) in inner.order.iter().enumerate() {
        if let Some(job) = inner.jobs.get(id) {
            let _ = job.tx.send(CrawlEvent::Queue {
                ahead_count: position + offset,
            });
        }
    }
}
