use thiserror::Error;

/// 优先级优化引擎错误类型定义
#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    /// 规则或调度配置无效，写入时拒绝
    #[error("验证错误: {0}")]
    Validation(String),

    /// 单条规则的触发/排除条件无法求值，只影响该规则
    #[error("规则 {rule_id} 求值失败: {message}")]
    RuleEvaluation { rule_id: i64, message: String },

    /// 评分、历史或任务优先级写入失败
    #[error("持久化错误: {0}")]
    Persistence(String),

    /// 候选任务枚举失败，整个作业中止
    #[error("作业致命错误: {0}")]
    FatalJob(String),

    #[error("优化规则未找到: {id}")]
    RuleNotFound { id: i64 },

    #[error("优化调度未找到: {id}")]
    ScheduleNotFound { id: i64 },

    #[error("优化作业未找到: {id}")]
    JobNotFound { id: i64 },

    #[error("优化历史未找到: {id}")]
    HistoryNotFound { id: i64 },

    #[error("任务未找到: {id}")]
    TaskNotFound { id: i64 },

    #[error("优化历史 {id} 已经回滚")]
    AlreadyReverted { id: i64 },

    #[error("优化历史 {id} 已经记录过反馈")]
    FeedbackAlreadyRecorded { id: i64 },

    #[error("调度 {schedule_id} 已有活跃作业")]
    JobAlreadyActive { schedule_id: i64 },

    #[error("作业已取消: {0}")]
    Cancelled(String),

    #[error("作业执行超时")]
    Timeout,

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl OptimizerError {
    /// 是否为单个任务级别的错误（不应导致作业失败）
    pub fn is_per_task(&self) -> bool {
        matches!(
            self,
            OptimizerError::Persistence(_)
                | OptimizerError::Database(_)
                | OptimizerError::TaskNotFound { .. }
                | OptimizerError::RuleEvaluation { .. }
        )
    }

    /// 错误分类名称，写入作业错误详情
    pub fn kind(&self) -> &'static str {
        match self {
            OptimizerError::Database(_) => "database",
            OptimizerError::Validation(_) => "validation",
            OptimizerError::RuleEvaluation { .. } => "rule_evaluation",
            OptimizerError::Persistence(_) => "persistence",
            OptimizerError::FatalJob(_) => "fatal_job",
            OptimizerError::RuleNotFound { .. }
            | OptimizerError::ScheduleNotFound { .. }
            | OptimizerError::JobNotFound { .. }
            | OptimizerError::HistoryNotFound { .. }
            | OptimizerError::TaskNotFound { .. } => "not_found",
            OptimizerError::AlreadyReverted { .. }
            | OptimizerError::FeedbackAlreadyRecorded { .. }
            | OptimizerError::JobAlreadyActive { .. } => "conflict",
            OptimizerError::Cancelled(_) => "cancelled",
            OptimizerError::Timeout => "timeout",
            OptimizerError::InvalidCron { .. } => "invalid_cron",
            OptimizerError::Serialization(_) => "serialization",
            OptimizerError::Configuration(_) => "configuration",
            OptimizerError::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for OptimizerError {
    fn from(err: serde_json::Error) -> Self {
        OptimizerError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type OptimizerResult<T> = std::result::Result<T, OptimizerError>;
