use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use tracing::info;

use optimizer_dispatcher::OptimizeRequest;

use crate::{error::ApiResult, middleware::Owner, response::success, routes::AppState};

fn default_limit() -> usize {
    10
}

/// 推荐请求
#[derive(Debug, Deserialize)]
pub struct RecommendationRequest {
    #[serde(default)]
    pub task_ids: Option<Vec<i64>>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// 只读推荐，不修改任何任务
pub async fn recommendations(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Json(request): Json<RecommendationRequest>,
) -> ApiResult<impl IntoResponse> {
    let limit = request.limit.min(state.max_recommendations);
    let batch = state
        .service
        .recommendations(owner_id, request.task_ids, limit)
        .await?;
    Ok(success(batch))
}

/// 同步执行一次手动优化
pub async fn optimize(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Json(request): Json<OptimizeRequest>,
) -> ApiResult<impl IntoResponse> {
    let response = state.service.optimize(owner_id, request).await?;
    info!(
        owner_id,
        job_id = response.job.id,
        status = %response.job.status,
        priorities_changed = response.job.priorities_changed,
        "Manual optimization finished"
    );
    Ok(success(response))
}
