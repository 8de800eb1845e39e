use serde::{Deserialize, Serialize};

/// HTTP接口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    /// `host:port`
    pub bind_address: String,
    pub cors_enabled: bool,
    /// 包含 `*` 时允许任意来源
    pub cors_origins: Vec<String>,
    pub request_timeout_seconds: u64,
    pub max_request_size_mb: usize,
    /// 推荐接口单次返回的最大条数
    pub max_recommendations: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8080".to_string(),
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
            request_timeout_seconds: 30,
            max_request_size_mb: 2,
            max_recommendations: 100,
        }
    }
}

impl ApiConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.bind_address.contains(':') {
            return Err(anyhow::anyhow!(
                "绑定地址格式无效，应为 host:port，当前为 '{}'",
                self.bind_address
            ));
        }
        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("请求超时时间必须大于0"));
        }
        if self.max_request_size_mb == 0 {
            return Err(anyhow::anyhow!("最大请求大小必须大于0"));
        }
        if self.max_recommendations == 0 {
            return Err(anyhow::anyhow!("推荐条数上限必须大于0"));
        }
        Ok(())
    }

    pub fn max_request_bytes(&self) -> usize {
        self.max_request_size_mb * 1024 * 1024
    }
}

/// 日志和指标配置，命令行参数优先
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// 关闭后不安装Prometheus记录器，`/metrics` 返回404
    pub metrics_enabled: bool,
    pub log_level: String,
    /// json 或 pretty
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.log_level.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志级别: {}，支持的级别: {:?}",
                self.log_level,
                LEVELS
            ));
        }
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(anyhow::anyhow!("无效的日志格式: {}", self.log_format));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_config_validation() {
        assert!(ApiConfig::default().validate().is_ok());

        let config = ApiConfig {
            bind_address: "8080".to_string(),
            ..ApiConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ApiConfig {
            max_recommendations: 0,
            ..ApiConfig::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(ApiConfig::default().max_request_bytes(), 2 * 1024 * 1024);
    }

    #[test]
    fn test_observability_validation() {
        let config = ObservabilityConfig {
            log_format: "xml".to_string(),
            ..ObservabilityConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
