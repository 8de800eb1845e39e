use std::sync::Arc;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{error, info};

use optimizer_api::create_app;
use optimizer_core::config::AppConfig;
use optimizer_dispatcher::OptimizationService;
use optimizer_infrastructure::{init_metrics, DatabaseManager, MetricsCollector, TracingActivityLog};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 仅运行调度协调器
    Coordinator,
    /// 仅运行API服务器
    Api,
    /// 运行所有组件
    All,
}

impl AppMode {
    /// 解析运行模式并检查对应组件是否在配置中启用
    pub fn parse(mode: &str, config: &AppConfig) -> Result<Self> {
        match mode {
            "coordinator" => {
                if !config.coordinator.enabled {
                    return Err(anyhow::anyhow!("协调器被禁用，请检查配置"));
                }
                Ok(AppMode::Coordinator)
            }
            "api" => {
                if !config.api.enabled {
                    return Err(anyhow::anyhow!("API服务被禁用，请检查配置"));
                }
                Ok(AppMode::Api)
            }
            "all" => Ok(AppMode::All),
            _ => Err(anyhow::anyhow!("不支持的运行模式: {mode}")),
        }
    }

    fn runs_coordinator(self, config: &AppConfig) -> bool {
        match self {
            AppMode::Coordinator => true,
            AppMode::Api => false,
            AppMode::All => config.coordinator.enabled,
        }
    }

    fn runs_api(self, config: &AppConfig) -> bool {
        match self {
            AppMode::Coordinator => false,
            AppMode::Api => true,
            AppMode::All => config.api.enabled,
        }
    }
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    database: DatabaseManager,
    service: Arc<OptimizationService>,
    metrics_handle: Option<PrometheusHandle>,
}

impl Application {
    /// 连接数据库、执行迁移并组装服务
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!(mode = ?mode, "Initializing application");

        let database = DatabaseManager::new(&config.database)
            .await
            .context("初始化数据库失败")?;
        database.migrate().await.context("运行数据库迁移失败")?;

        let metrics_handle = if config.observability.metrics_enabled {
            Some(init_metrics()?)
        } else {
            None
        };

        Ok(Self::with_database(config, mode, database, metrics_handle))
    }

    /// 使用已准备好的数据库组装应用，需要在tokio运行时内调用
    pub fn with_database(
        config: AppConfig,
        mode: AppMode,
        database: DatabaseManager,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Self {
        let service = Arc::new(OptimizationService::new(
            database.repositories(),
            Arc::new(TracingActivityLog),
            &config.worker,
            &config.coordinator,
            config.scoring.clone(),
            Arc::new(MetricsCollector::new()),
        ));

        Self {
            config,
            mode,
            database,
            service,
            metrics_handle,
        }
    }

    pub fn service(&self) -> Arc<OptimizationService> {
        Arc::clone(&self.service)
    }

    pub fn database(&self) -> &DatabaseManager {
        &self.database
    }

    /// 运行所选组件直到收到关闭信号，然后停止工作池并关闭数据库
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!(mode = ?self.mode, "Starting application");

        let mut handles = Vec::new();

        if self.mode.runs_coordinator(&self.config) {
            let coordinator = self.service.coordinator();
            let shutdown_rx = shutdown_rx.resubscribe();
            handles.push(tokio::spawn(async move {
                coordinator.run(shutdown_rx).await;
            }));
        }

        if self.mode.runs_api(&self.config) {
            let listener = TcpListener::bind(&self.config.api.bind_address)
                .await
                .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;
            info!(address = %self.config.api.bind_address, "API server listening");

            let app = create_app(
                self.service(),
                self.metrics_handle.clone(),
                &self.config.api,
            );
            let mut shutdown_rx = shutdown_rx.resubscribe();
            handles.push(tokio::spawn(async move {
                let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                });
                if let Err(e) = server.await {
                    error!(error = %e, "API server failed");
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Component task panicked");
            }
        }

        self.service.shutdown().await;
        self.database.close().await;
        info!("All components stopped");
        Ok(())
    }
}
