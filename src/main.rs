use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use tracing::{error, info};

use optimizer_core::config::AppConfig;
use optimizer_infrastructure::init_logging;
use priority_optimizer::{
    wait_for_shutdown_signal, AppMode, Application, ShutdownManager, DEFAULT_SHUTDOWN_TIMEOUT,
};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("priority-optimizer")
        .version(env!("CARGO_PKG_VERSION"))
        .about("智能任务优先级优化引擎")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时按默认路径查找"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("运行模式")
                .value_parser(["coordinator", "api", "all"])
                .default_value("all"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = arg(&matches, "config");
    let config = AppConfig::load(config_path).with_context(|| match config_path {
        Some(path) => format!("加载配置文件失败: {path}"),
        None => "加载配置失败".to_string(),
    })?;

    let log_level = arg(&matches, "log-level").unwrap_or(config.observability.log_level.as_str());
    let log_format = arg(&matches, "log-format").unwrap_or(config.observability.log_format.as_str());
    init_logging(log_level, log_format)?;

    let mode_str = arg(&matches, "mode").unwrap_or("all");
    info!(
        mode = mode_str,
        config = config_path.unwrap_or("<default>"),
        "Starting priority optimizer"
    );

    let mode = AppMode::parse(mode_str, &config)?;
    let app = Arc::new(Application::new(config, mode).await?);

    let shutdown_manager = ShutdownManager::new();
    let app_handle = {
        let app = Arc::clone(&app);
        let shutdown_rx = shutdown_manager.subscribe();
        tokio::spawn(async move {
            if let Err(e) = app.run(shutdown_rx).await {
                error!(error = %e, "Application failed");
            }
        })
    };

    wait_for_shutdown_signal().await;
    info!("Shutting down");

    shutdown_manager
        .shutdown_and_wait(app_handle, DEFAULT_SHUTDOWN_TIMEOUT)
        .await;

    info!("Priority optimizer exited");
    Ok(())
}

fn arg<'a>(matches: &'a ArgMatches, name: &str) -> Option<&'a str> {
    matches.get_one::<String>(name).map(String::as_str)
}
