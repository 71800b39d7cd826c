//! HTTP request handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::api::auth::BasicUser;
use crate::api::server::AppContext;
use crate::crawl::queue::{CrawlJobPayload, Credentials};
use crate::db::quizzes;
use crate::engine::{EngineAnalysis, EngineRequest};
use crate::error::{ApiError, ApiResult};
use crate::quiz::QuizRecord;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
pub struct GetQuizParams {
    pub player: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuizRequest {
    pub id: String,
    #[serde(default)]
    pub was_correct: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlRequest {
    #[serde(default)]
    pub days: Option<u32>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResponse {
    pub job_id: Uuid,
    pub ahead_count: usize,
}

/// Decode a JSON body into `T`, turning every shape mismatch into a 400.
fn decode_body<T: serde::de::DeserializeOwned>(body: Value) -> ApiResult<T> {
    serde_json::from_value(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// POST /analyzePositionFromMatch - ad-hoc engine query for one position
pub async fn analyze_position_from_match(
    State(ctx): State<AppContext>,
    Json(body): Json<Value>,
) -> ApiResult<Json<EngineAnalysis>> {
    let request: EngineRequest = decode_body(body)?;
    if request.match_id.trim().is_empty() {
        return Err(ApiError::BadRequest("matchId is required".to_string()));
    }
    let analysis = ctx
        .engine
        .analyze(&request)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(analysis))
}

/// GET /getQuiz - the highest-priority quiz, 204 when there is none
pub async fn get_quiz(
    State(ctx): State<AppContext>,
    user: BasicUser,
    Query(params): Query<GetQuizParams>,
) -> ApiResult<Response> {
    let next = quizzes::next_quiz(&ctx.db, &user.storage_key, params.player.as_deref())
        .await
        .map_err(ApiError::from)?;
    match next {
        Some(quiz) => Ok(Json(quiz).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// GET /getQuiz/:id
pub async fn get_quiz_by_id(
    State(ctx): State<AppContext>,
    user: BasicUser,
    Path(id): Path<String>,
) -> ApiResult<Json<QuizRecord>> {
    quizzes::get_quiz_by_id(&ctx.db, &user.storage_key, &id)
        .await
        .map_err(ApiError::from)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("quiz {} not found", id)))
}

/// POST /updateQuiz - record one answer
pub async fn update_quiz(
    State(ctx): State<AppContext>,
    user: BasicUser,
    Json(body): Json<Value>,
) -> ApiResult<Json<QuizRecord>> {
    let request: UpdateQuizRequest = decode_body(body)?;
    let was_correct = request.was_correct.unwrap_or(false);
    quizzes::record_quiz_result(&ctx.db, &user.storage_key, &request.id, was_correct)
        .await
        .map_err(ApiError::from)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("quiz {} not found", request.id)))
}

/// GET /getPlayers - sorted unique player names across all stores
pub async fn get_players(
    State(ctx): State<AppContext>,
    _user: BasicUser,
) -> ApiResult<Json<Vec<String>>> {
    let players = quizzes::list_players(&ctx.db).await.map_err(ApiError::from)?;
    Ok(Json(players))
}

/// GET /getStatistics
pub async fn get_statistics(
    State(ctx): State<AppContext>,
    user: BasicUser,
) -> ApiResult<Json<quizzes::Statistics>> {
    let stats = quizzes::statistics(&ctx.db, &user.storage_key)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(stats))
}

/// POST /addLastMatchesAndSave - enqueue a crawl job
pub async fn add_last_matches_and_save(
    State(ctx): State<AppContext>,
    user: BasicUser,
    body: Option<Json<Value>>,
) -> ApiResult<Json<CrawlResponse>> {
    let request: CrawlRequest = match body {
        Some(Json(value)) => decode_body(value)?,
        None => CrawlRequest {
            days: None,
            user_id: None,
        },
    };

    let payload = CrawlJobPayload {
        storage_key: user.storage_key.clone(),
        credentials: Credentials {
            user: user.name.clone(),
            password: user.password.clone(),
        },
        days: request.days.unwrap_or(ctx.config.days),
        site_user_id: request.user_id,
    };

    let (job_id, ahead_count) = ctx.queue.submit(payload);
    info!(user = %user.storage_key, job = %job_id, ahead_count, "crawl requested");
    Ok(Json(CrawlResponse {
        job_id,
        ahead_count,
    }))
}
