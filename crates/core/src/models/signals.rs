use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 预聚合信号集合，值约定在 [0,1] 区间
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SignalMap {
    #[serde(default)]
    pub values: HashMap<String, f64>,
    /// 聚合所依据的样本数量，用于计算置信度
    #[serde(default)]
    pub sample_size: u32,
}

impl SignalMap {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    /// 指定键（为空时取全部键）的信号均值，结果截断到 [0,1]
    pub fn mean_of(&self, keys: &[String]) -> Option<f64> {
        let values: Vec<f64> = if keys.is_empty() {
            self.values.values().copied().collect()
        } else {
            keys.iter().filter_map(|k| self.get(k)).collect()
        };

        let finite: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }
        let mean = finite.iter().sum::<f64>() / finite.len() as f64;
        Some(mean.clamp(0.0, 1.0))
    }
}

/// 单个任务的模式信号（历史聚合）和上下文信号（调用方提供）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TaskSignals {
    #[serde(default)]
    pub pattern: SignalMap,
    #[serde(default)]
    pub context: SignalMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_of_selected_keys() {
        let mut map = SignalMap::default();
        map.values.insert("focus".to_string(), 0.8);
        map.values.insert("energy".to_string(), 0.4);
        map.values.insert("noise".to_string(), 3.0);

        let mean = map.mean_of(&["focus".to_string(), "energy".to_string()]).unwrap();
        assert!((mean - 0.6).abs() < 1e-9);
        assert_eq!(map.mean_of(&["missing".to_string()]), None);
        assert_eq!(map.mean_of(&["noise".to_string()]), Some(1.0));
    }
}
