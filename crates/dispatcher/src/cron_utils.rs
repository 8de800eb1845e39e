use chrono::{DateTime, NaiveTime, Timelike, Utc};
use cron::Schedule;
use std::str::FromStr;
use tracing::debug;

use optimizer_core::{OptimizerError, OptimizerResult};

/// CRON表达式解析和调度工具
pub struct CronScheduler {
    schedule: Schedule,
}

impl CronScheduler {
    pub fn new(cron_expr: &str) -> OptimizerResult<Self> {
        let schedule = Schedule::from_str(cron_expr).map_err(|e| OptimizerError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self { schedule })
    }

    /// 每天在给定时刻（UTC）触发的调度器
    pub fn daily_at(time_of_day: NaiveTime) -> OptimizerResult<Self> {
        Self::new(&Self::daily_expression(time_of_day))
    }

    /// 生成 `秒 分 时 日 月 周` 格式的每日表达式
    pub fn daily_expression(time_of_day: NaiveTime) -> String {
        format!(
            "{} {} {} * * *",
            time_of_day.second(),
            time_of_day.minute(),
            time_of_day.hour()
        )
    }

    /// 严格晚于 `from` 的下一次执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let next = self.schedule.after(&from).next();
        if let Some(next) = next {
            debug!(
                "下次执行时间: {}, 参考时间: {}",
                next.format("%Y-%m-%d %H:%M:%S UTC"),
                from.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        next
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    /// 验证CRON表达式是否有效
    pub fn validate_cron_expression(cron_expr: &str) -> OptimizerResult<()> {
        Self::new(cron_expr).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_daily_expression() {
        let time = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        assert_eq!(CronScheduler::daily_expression(time), "0 30 9 * * *");
    }

    #[test]
    fn test_next_daily_occurrence_is_strictly_after() {
        let scheduler = CronScheduler::daily_at(NaiveTime::from_hms_opt(9, 0, 0).unwrap()).unwrap();

        let before = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        assert_eq!(
            scheduler.next_execution_time(before),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap())
        );

        let exactly = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        assert_eq!(
            scheduler.next_execution_time(exactly),
            Some(Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_upcoming_times() {
        let scheduler = CronScheduler::new("0 0 * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        let times = scheduler.upcoming_times(from, 3);
        assert_eq!(times.len(), 3);
        assert_eq!(times[0], Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
        assert_eq!(times[2], Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap());
    }

    #[test]
    fn test_invalid_expression() {
        let err = CronScheduler::validate_cron_expression("not a cron").unwrap_err();
        assert!(matches!(err, OptimizerError::InvalidCron { .. }));
    }
}
