use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{
    error::ApiResult,
    middleware::Owner,
    response::{accepted, success},
    routes::AppState,
};

/// 列表查询参数
#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<u32>,
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Query(params): Query<LimitParams>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.service.list_jobs(owner_id, params.limit).await?))
}

pub async fn get_job(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.service.get_job(owner_id, id).await?))
}

/// 以原参数重新提交已结束的作业
pub async fn retry_job(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(accepted(state.service.retry_job(owner_id, id).await?))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.service.cancel_job(owner_id, id).await?))
}
