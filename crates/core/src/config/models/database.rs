use serde::{Deserialize, Serialize};

/// SQLite连接池配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 例如 `sqlite:optimizer.db?mode=rwc`，测试使用 `sqlite::memory:`
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
    /// 写锁被占用时的等待时间
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:optimizer.db?mode=rwc".to_string(),
            max_connections: 10,
            min_connections: 1,
            connection_timeout_seconds: 30,
            idle_timeout_seconds: 600,
            busy_timeout_ms: 5000,
        }
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.url.starts_with("sqlite:") {
            return Err(anyhow::anyhow!(
                "数据库URL必须以 sqlite: 开头，当前为 '{}'",
                self.url
            ));
        }
        if self.max_connections == 0 || self.min_connections > self.max_connections {
            return Err(anyhow::anyhow!(
                "连接数配置无效: min={} max={}",
                self.min_connections,
                self.max_connections
            ));
        }
        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("连接超时时间必须大于0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_sqlite_url() {
        let config = DatabaseConfig {
            url: "postgres://localhost/optimizer".to_string(),
            ..DatabaseConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_pool_bounds() {
        let config = DatabaseConfig {
            min_connections: 5,
            max_connections: 2,
            ..DatabaseConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(DatabaseConfig::default().validate().is_ok());
    }
}
