//! # 数据模型
//!
//! 定义优先级优化引擎的核心数据结构：优化规则、评分记录、优化历史、
//! 优化调度、优化作业，以及由外部协作方提供的任务快照和信号。
//!
//! ## 设计原则
//!
//! - 所有时间字段使用 `DateTime<Utc>`
//! - 状态字段使用枚举类型，数据库中以小写文本存储
//! - 规则配置和条件使用强类型结构，未知规则类型保留原始JSON
//!
//! ## 状态流转
//!
//! ### 作业状态
//! ```text
//! Pending → Running → Completed
//!              ↓
//!            Failed
//! ```
//!
//! ### 调度状态
//! ```text
//! Idle → Due → Running → Idle
//! ```

pub mod activity;
pub mod conditions;
pub mod history;
pub mod job;
pub mod priority;
pub mod recommendation;
pub mod rule;
pub mod schedule;
pub mod score;
pub mod signals;
pub mod stats;
pub mod task;

pub use activity::*;
pub use conditions::*;
pub use history::*;
pub use job::*;
pub use priority::*;
pub use recommendation::*;
pub use rule::*;
pub use schedule::*;
pub use score::*;
pub use signals::*;
pub use stats::*;
pub use task::*;

/// 为以小写文本存储的枚举实现SQLite编解码
///
/// 要求类型实现 `as_str()` 和 `FromStr`。
#[macro_export]
macro_rules! impl_sqlite_text_enum {
    ($ty:ty) => {
        impl sqlx::Type<sqlx::Sqlite> for $ty {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <str as sqlx::Type<sqlx::Sqlite>>::type_info()
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $ty {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                s.parse::<$ty>().map_err(Into::into)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
            }
        }
    };
}
