use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use optimizer_core::OptimizerError;
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("优化引擎错误: {0}")]
    Optimizer(#[from] OptimizerError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("缺少 X-Owner-Id 请求头")]
    MissingOwner,

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, String, &'static str, Vec<String>) {
        match self {
            ApiError::Optimizer(OptimizerError::Validation(msg)) => (
                StatusCode::BAD_REQUEST,
                format!("参数验证失败: {msg}"),
                "VALIDATION_ERROR",
                vec![
                    "请检查请求参数是否符合要求".to_string(),
                    "规则权重必须在 [0,1] 区间内，置信度阈值同理".to_string(),
                ],
            ),
            ApiError::Optimizer(OptimizerError::InvalidCron { expr, message }) => (
                StatusCode::BAD_REQUEST,
                format!("调度时间 '{expr}' 无效: {message}"),
                "INVALID_SCHEDULE_TIME",
                vec!["daily 调度的 time_of_day 格式为 HH:MM 或 HH:MM:SS (UTC)".to_string()],
            ),
            ApiError::Optimizer(OptimizerError::RuleNotFound { id }) => (
                StatusCode::NOT_FOUND,
                format!("优化规则 ID {id} 不存在"),
                "RULE_NOT_FOUND",
                vec!["使用 GET /priority/rules 查看所有规则".to_string()],
            ),
            ApiError::Optimizer(OptimizerError::ScheduleNotFound { id }) => (
                StatusCode::NOT_FOUND,
                format!("优化调度 ID {id} 不存在"),
                "SCHEDULE_NOT_FOUND",
                vec!["使用 GET /priority/schedules 查看所有调度".to_string()],
            ),
            ApiError::Optimizer(OptimizerError::JobNotFound { id }) => (
                StatusCode::NOT_FOUND,
                format!("优化作业 ID {id} 不存在"),
                "JOB_NOT_FOUND",
                vec!["请检查作业ID是否正确".to_string()],
            ),
            ApiError::Optimizer(OptimizerError::HistoryNotFound { id }) => (
                StatusCode::NOT_FOUND,
                format!("优化历史 ID {id} 不存在"),
                "HISTORY_NOT_FOUND",
                vec!["使用 GET /priority/history 查看优化历史".to_string()],
            ),
            ApiError::Optimizer(OptimizerError::TaskNotFound { id }) => (
                StatusCode::NOT_FOUND,
                format!("任务 ID {id} 不存在"),
                "TASK_NOT_FOUND",
                vec!["请检查任务ID是否正确".to_string()],
            ),
            ApiError::Optimizer(OptimizerError::AlreadyReverted { id }) => (
                StatusCode::CONFLICT,
                format!("优化历史 {id} 已经回滚"),
                "ALREADY_REVERTED",
                vec!["同一条优化历史只能回滚一次".to_string()],
            ),
            ApiError::Optimizer(OptimizerError::FeedbackAlreadyRecorded { id }) => (
                StatusCode::CONFLICT,
                format!("优化历史 {id} 已经记录过反馈"),
                "FEEDBACK_ALREADY_RECORDED",
                vec!["每条优化历史只接受一次反馈".to_string()],
            ),
            ApiError::Optimizer(OptimizerError::JobAlreadyActive { schedule_id }) => (
                StatusCode::CONFLICT,
                format!("调度 {schedule_id} 已有待执行或运行中的作业"),
                "JOB_ALREADY_ACTIVE",
                vec![
                    "等待当前作业结束后重试".to_string(),
                    "或使用 POST /priority/jobs/{id}/cancel 取消当前作业".to_string(),
                ],
            ),
            ApiError::Optimizer(OptimizerError::Cancelled(msg)) => (
                StatusCode::CONFLICT,
                format!("作业已取消: {msg}"),
                "JOB_CANCELLED",
                vec!["可使用 POST /priority/jobs/{id}/retry 重新执行".to_string()],
            ),
            ApiError::Optimizer(OptimizerError::Timeout) => (
                StatusCode::GATEWAY_TIMEOUT,
                "作业执行超时".to_string(),
                "JOB_TIMEOUT",
                vec!["减小优化范围或调高 worker.job_timeout_seconds".to_string()],
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                format!("请求参数错误: {msg}"),
                "BAD_REQUEST",
                vec!["请检查请求参数格式".to_string()],
            ),
            ApiError::MissingOwner => (
                StatusCode::UNAUTHORIZED,
                "缺少 X-Owner-Id 请求头".to_string(),
                "MISSING_OWNER",
                vec!["所有 /priority 接口都需要在 X-Owner-Id 请求头中提供用户ID".to_string()],
            ),
            ApiError::Optimizer(other) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "系统内部错误".to_string(),
                "INTERNAL_ERROR",
                vec![
                    "系统遇到内部错误，请稍后重试".to_string(),
                    format!("错误类别: {}", other.kind()),
                ],
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "系统内部错误".to_string(),
                "INTERNAL_ERROR",
                vec![
                    "系统遇到内部错误，请稍后重试".to_string(),
                    format!("错误详情: {msg}"),
                ],
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, error_type, suggestions) = self.parts();
        if status.is_server_error() {
            error!(error = %self, error_type, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": error_type,
                "code": status.as_u16(),
                "suggestions": suggestions,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimizer_error_conversion() {
        let api_error: ApiError = OptimizerError::RuleNotFound { id: 12 }.into();
        assert!(matches!(
            api_error,
            ApiError::Optimizer(OptimizerError::RuleNotFound { id: 12 })
        ));
    }

    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (
                ApiError::Optimizer(OptimizerError::Validation("权重越界".to_string())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Optimizer(OptimizerError::HistoryNotFound { id: 1 }),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Optimizer(OptimizerError::AlreadyReverted { id: 1 }),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::Optimizer(OptimizerError::JobAlreadyActive { schedule_id: 3 }),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::Optimizer(OptimizerError::Persistence("写入失败".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::MissingOwner, StatusCode::UNAUTHORIZED),
            (
                ApiError::BadRequest("X-Owner-Id 无效".to_string()),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_error_type_codes() {
        let (_, _, error_type, suggestions) =
            ApiError::Optimizer(OptimizerError::FeedbackAlreadyRecorded { id: 4 }).parts();
        assert_eq!(error_type, "FEEDBACK_ALREADY_RECORDED");
        assert!(!suggestions.is_empty());
    }
}
