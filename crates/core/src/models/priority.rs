use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::OptimizerError;

/// 任务优先级
///
/// 排序与紧急程度一致：`Low < Medium < High < Urgent`。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// 低于此分数为 low
    pub const MEDIUM_THRESHOLD: f64 = 0.25;
    /// 低于此分数为 medium
    pub const HIGH_THRESHOLD: f64 = 0.5;
    /// 低于此分数为 high，否则为 urgent
    pub const URGENT_THRESHOLD: f64 = 0.75;

    /// 将综合评分映射为优先级，阈值固定且单调
    pub fn from_score(score: f64) -> Self {
        if score >= Self::URGENT_THRESHOLD {
            Priority::Urgent
        } else if score >= Self::HIGH_THRESHOLD {
            Priority::High
        } else if score >= Self::MEDIUM_THRESHOLD {
            Priority::Medium
        } else {
            Priority::Low
        }
    }

    /// 显式优先级对应的重要性基线
    pub fn importance(&self) -> f64 {
        match self {
            Priority::Low => 0.25,
            Priority::Medium => 0.5,
            Priority::High => 0.75,
            Priority::Urgent => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    /// 中文标签，用于推荐理由
    pub fn label(&self) -> &'static str {
        match self {
            Priority::Low => "低",
            Priority::Medium => "中",
            Priority::High => "高",
            Priority::Urgent => "紧急",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = OptimizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            _ => Err(OptimizerError::Validation(format!("无效的优先级: {s}"))),
        }
    }
}

crate::impl_sqlite_text_enum!(Priority);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_score_buckets() {
        assert_eq!(Priority::from_score(0.0), Priority::Low);
        assert_eq!(Priority::from_score(0.249), Priority::Low);
        assert_eq!(Priority::from_score(0.25), Priority::Medium);
        assert_eq!(Priority::from_score(0.5), Priority::High);
        assert_eq!(Priority::from_score(0.75), Priority::Urgent);
        assert_eq!(Priority::from_score(1.0), Priority::Urgent);
    }

    #[test]
    fn test_from_score_is_monotonic() {
        let mut previous = Priority::from_score(0.0);
        for step in 0..=100 {
            let current = Priority::from_score(step as f64 / 100.0);
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("urgent".parse::<Priority>().unwrap(), Priority::Urgent);
        assert_eq!(Priority::High.to_string(), "high");
        assert!("critical".parse::<Priority>().is_err());
    }
}
