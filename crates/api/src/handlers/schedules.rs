use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use optimizer_core::models::{OptimizationSchedule, ScheduleState};
use optimizer_dispatcher::ScheduleDraft;

use crate::{
    error::ApiResult,
    handlers::rules::SetActiveRequest,
    middleware::Owner,
    response::{accepted, created, success, ApiResponse},
    routes::AppState,
};

/// 调度详情，附带由调度时间和活跃作业推导出的运行状态
#[derive(Debug, Serialize)]
pub struct ScheduleDetail {
    #[serde(flatten)]
    pub schedule: OptimizationSchedule,
    pub state: ScheduleState,
}

pub async fn list_schedules(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.service.list_schedules(owner_id).await?))
}

pub async fn create_schedule(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Json(draft): Json<ScheduleDraft>,
) -> ApiResult<impl IntoResponse> {
    Ok(created(state.service.create_schedule(owner_id, draft).await?))
}

pub async fn get_schedule(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let schedule = state.service.get_schedule(owner_id, id).await?;
    let schedule_state = state.service.schedule_state(owner_id, id).await?;
    Ok(success(ScheduleDetail {
        schedule,
        state: schedule_state,
    }))
}

pub async fn update_schedule(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<i64>,
    Json(draft): Json<ScheduleDraft>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(
        state.service.update_schedule(owner_id, id, draft).await?,
    ))
}

/// 停用调度会取消其活跃作业
pub async fn set_schedule_active(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<i64>,
    Json(request): Json<SetActiveRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(
        state
            .service
            .set_schedule_active(owner_id, id, request.is_active)
            .await?,
    ))
}

pub async fn delete_schedule(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.service.delete_schedule(owner_id, id).await?;
    Ok(ApiResponse::success_empty_with_message(format!(
        "调度 {id} 已删除"
    )))
}

/// 立即运行调度，作业在后台执行
pub async fn run_schedule(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(accepted(state.service.run_schedule_now(owner_id, id).await?))
}
