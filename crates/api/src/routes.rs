use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use optimizer_dispatcher::OptimizationService;

use crate::handlers::{
    feedback::{list_history, record_feedback, revert, stats},
    health::{health_check, metrics},
    jobs::{cancel_job, get_job, list_jobs, retry_job},
    optimize::{optimize, recommendations},
    rules::{create_rule, delete_rule, get_rule, list_rules, set_rule_active, update_rule},
    schedules::{
        create_schedule, delete_schedule, get_schedule, list_schedules, run_schedule,
        set_schedule_active, update_schedule,
    },
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OptimizationService>,
    pub metrics_handle: Option<PrometheusHandle>,
    /// 单次推荐返回条数上限
    pub max_recommendations: usize,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查和指标
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        // 推荐与优化
        .route("/priority/recommendations", post(recommendations))
        .route("/priority/optimize", post(optimize))
        // 规则
        .route("/priority/rules", get(list_rules).post(create_rule))
        .route(
            "/priority/rules/{id}",
            get(get_rule).put(update_rule).delete(delete_rule),
        )
        .route("/priority/rules/{id}/active", post(set_rule_active))
        // 调度
        .route(
            "/priority/schedules",
            get(list_schedules).post(create_schedule),
        )
        .route(
            "/priority/schedules/{id}",
            get(get_schedule).put(update_schedule).delete(delete_schedule),
        )
        .route("/priority/schedules/{id}/active", post(set_schedule_active))
        .route("/priority/schedules/{id}/run", post(run_schedule))
        // 作业
        .route("/priority/jobs", get(list_jobs))
        .route("/priority/jobs/{id}", get(get_job))
        .route("/priority/jobs/{id}/retry", post(retry_job))
        .route("/priority/jobs/{id}/cancel", post(cancel_job))
        // 历史、反馈与统计
        .route("/priority/history", get(list_history))
        .route("/priority/feedback", post(record_feedback))
        .route("/priority/revert", post(revert))
        .route("/priority/stats", get(stats))
        .with_state(state)
}
