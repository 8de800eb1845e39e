//! # Optimizer API
//!
//! 优先级优化引擎的HTTP接口，基于Axum构建。所有 `/priority` 接口从
//! `X-Owner-Id` 请求头读取用户ID，成功响应统一包装为
//! `ApiResponse { success, data, message, timestamp }`，错误响应为
//! `{"error": {message, type, code, suggestions, timestamp}}`。
//!
//! ## API 端点
//!
//! - `POST /priority/recommendations` - 只读推荐
//! - `POST /priority/optimize` - 同步执行手动优化
//! - `/priority/rules` - 规则管理
//! - `/priority/schedules` - 调度管理，`POST /priority/schedules/{id}/run` 立即运行
//! - `/priority/jobs` - 作业查询、重试和取消
//! - `GET /priority/history`、`POST /priority/feedback`、`POST /priority/revert`
//! - `GET /priority/stats` - 统计
//! - `GET /health`、`GET /metrics`

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use axum::{extract::DefaultBodyLimit, Router};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;

use metrics_exporter_prometheus::PrometheusHandle;
use optimizer_core::config::ApiConfig;
use optimizer_dispatcher::OptimizationService;

use middleware::{cors_layer, request_logging, trace_layer};
use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(
    service: Arc<OptimizationService>,
    metrics_handle: Option<PrometheusHandle>,
    api_config: &ApiConfig,
) -> Router {
    let state = AppState {
        service,
        metrics_handle,
        max_recommendations: api_config.max_recommendations.max(1),
    };

    let router = create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging))
            .layer(TimeoutLayer::new(Duration::from_secs(
                api_config.request_timeout_seconds,
            )))
            .layer(DefaultBodyLimit::max(api_config.max_request_bytes())),
    );

    if api_config.cors_enabled {
        router.layer(cors_layer(&api_config.cors_origins))
    } else {
        router
    }
}
