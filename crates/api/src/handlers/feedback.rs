use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::{
    error::ApiResult, handlers::jobs::LimitParams, middleware::Owner, response::success,
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub history_id: i64,
    pub accepted: bool,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RevertRequest {
    pub history_id: i64,
}

pub async fn list_history(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Query(params): Query<LimitParams>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.service.history(owner_id, params.limit).await?))
}

pub async fn record_feedback(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Json(request): Json<FeedbackRequest>,
) -> ApiResult<impl IntoResponse> {
    let history = state
        .service
        .record_feedback(
            owner_id,
            request.history_id,
            request.accepted,
            request.feedback,
        )
        .await?;
    Ok(success(history))
}

/// 把任务优先级恢复为优化前的值
pub async fn revert(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Json(request): Json<RevertRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.service.revert(owner_id, request.history_id).await?))
}

pub async fn stats(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.service.stats(owner_id).await?))
}
