use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use optimizer_domain::{RuleDeletion, RuleDraft};

use crate::{
    error::ApiResult,
    middleware::Owner,
    response::{created, success, success_with_message},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

pub async fn list_rules(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.service.list_rules(owner_id).await?))
}

pub async fn create_rule(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Json(draft): Json<RuleDraft>,
) -> ApiResult<impl IntoResponse> {
    Ok(created(state.service.create_rule(owner_id, draft).await?))
}

pub async fn get_rule(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.service.get_rule(owner_id, id).await?))
}

pub async fn update_rule(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<i64>,
    Json(draft): Json<RuleDraft>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.service.update_rule(owner_id, id, draft).await?))
}

pub async fn set_rule_active(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<i64>,
    Json(request): Json<SetActiveRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(
        state
            .service
            .set_rule_active(owner_id, id, request.is_active)
            .await?,
    ))
}

/// 被历史记录引用的规则只会被停用
pub async fn delete_rule(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.service.delete_rule(owner_id, id).await?;
    let message = match outcome {
        RuleDeletion::Deleted => "规则已删除",
        RuleDeletion::Disabled => "规则已被优化历史引用，已改为停用",
    };
    Ok(success_with_message(outcome, message))
}
