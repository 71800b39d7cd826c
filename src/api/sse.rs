//! Crawl progress stream
//!
//! A client attaches to a job by id and receives the current state
//! synchronously, then live `queue`/`progress` events until the terminal
//! `done` or `error` closes the stream. Dropping the stream never cancels
//! the job.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::api::auth::BasicUser;
use crate::api::server::AppContext;
use crate::error::{ApiError, ApiResult};
use crate::events::CrawlEvent;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamParams {
    pub job_id: Uuid,
}

/// GET /addLastMatchesAndSave/stream?jobId=...
pub async fn crawl_stream(
    State(ctx): State<AppContext>,
    _user: BasicUser,
    Query(params): Query<StreamParams>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let (snapshot, receiver) = ctx
        .queue
        .subscribe(params.job_id)
        .ok_or_else(|| ApiError::NotFound(format!("job {} not found", params.job_id)))?;

    info!(job = %params.job_id, "SSE listener attached");

    let stream = async_stream::stream! {
        let terminal = snapshot.is_terminal();
        yield Ok(sse_event(&snapshot));

        if !terminal {
            if let Some(mut receiver) = receiver {
                loop {
                    match receiver.recv().await {
                        Ok(event) => {
                            let terminal = event.is_terminal();
                            yield Ok(sse_event(&event));
                            if terminal {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "SSE listener lagged, skipping stale events");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

fn sse_event(event: &CrawlEvent) -> Event {
    Event::default()
        .event(event.event_type())
        .json_data(event)
        .unwrap_or_else(|_| Event::default().event(event.event_type()).data("{}"))
}
