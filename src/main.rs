//! nonce-keeper 主程序
//!
//! 加载配置、初始化日志，然后执行单次 nonce 操作或常驻运行过期清理任务

mod cli;
mod config;
mod error;
mod observability;

use anyhow::Context;
use clap::Parser;
use config::AppConfig;
use nonce_service::{NonceService, StorageBackend};
use observability::init_observability;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, error, info, warn};

macro_rules! bootstrap_info {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

macro_rules! bootstrap_error {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

use cli::{Cli, Commands};
use error::{Error, Result};

/// Application launcher utilities
struct ApplicationLauncher;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let result = match &cli.command {
        Some(Commands::Test { config_file }) => ApplicationLauncher::find_config_file(
            config_file.as_ref().unwrap_or(&cli.config),
        )
        .and_then(|config_path| ApplicationLauncher::test_config_file(&config_path)),
        command => ApplicationLauncher::find_config_file(&cli.config).and_then(|config_path| {
            // Create Tokio runtime（before running the application）
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;

            runtime.block_on(ApplicationLauncher::run_application(
                &config_path,
                command.as_ref(),
            ))
        }),
    };

    if let Err(e) = &result {
        bootstrap_error!("❌ {}", e);
    }
    result
}

impl ApplicationLauncher {
    /// Find config file with fallback locations
    fn find_config_file(provided_path: &PathBuf) -> Result<PathBuf> {
        // If the provided path is not the default "config.toml", check if it exists
        if provided_path != Path::new("config.toml") {
            if provided_path.exists() {
                return Ok(provided_path.clone());
            }
            bootstrap_error!("Provided config file not found: {:?}", provided_path);
            return Err(Error::Config(format!(
                "Config file not found: {provided_path:?}"
            )));
        }

        let fallback_paths = [
            // 1. Current working directory
            PathBuf::from("config.toml"),
            // 2. System config directory
            PathBuf::from("/etc/nonce-keeper/config.toml"),
        ];

        for path in &fallback_paths {
            if path.exists() {
                bootstrap_info!("Found config file: {:?}", path);
                return Ok(path.clone());
            }
        }

        bootstrap_error!("No configuration file found!");
        bootstrap_error!("Please create a config file in one of these locations:");
        for (i, path) in fallback_paths.iter().enumerate() {
            bootstrap_error!("  {}. {:?}", i + 1, path);
        }
        bootstrap_error!("Or specify a custom path with: nonce-keeper --config <path>");

        Err(Error::Config(
            "No configuration file found. Please create one or specify path with --config".into(),
        ))
    }

    /// 测试配置文件是否有效
    fn test_config_file(config_path: &Path) -> Result<()> {
        // Initialize basic logging for test command
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();

        match AppConfig::from_file(config_path) {
            Ok(config) => {
                info!("✅ 配置文件解析成功: {:?}", config_path);
                Self::report_validation(&config)?;
                info!("✅ 完整配置验证通过");
                Ok(())
            }
            Err(e) => {
                error!("❌ 配置文件解析失败: {}", e);
                Err(Error::service_validation(format!("配置解析失败: {e}")))
            }
        }
    }

    /// 输出校验结果，存在非警告问题时返回错误
    fn report_validation(config: &AppConfig) -> Result<()> {
        let Err(errors) = config.validate() else {
            info!("✅ 配置验证通过");
            return Ok(());
        };

        warn!("配置验证发现问题:");
        for (i, err) in errors.iter().enumerate() {
            if err.starts_with("Warning:") {
                warn!("  {}. ⚠️  {}", i + 1, err);
            } else {
                error!("  {}. ❌ {}", i + 1, err);
            }
        }

        if errors.iter().any(|e| !e.starts_with("Warning:")) {
            return Err(Error::service_validation("配置验证失败，请修复上述错误"));
        }
        Ok(())
    }

    /// 运行应用程序的主入口
    async fn run_application(config_path: &Path, command: Option<&Commands>) -> Result<()> {
        let config = AppConfig::from_file(config_path)?;

        // 初始化日志
        let _observability_guard = init_observability(&config.observability)?;
        Self::report_validation(&config)?;

        // ensure the SQLite data directory exists
        if config.storage.backend == StorageBackend::Sqlite
            && let Some(sqlite) = &config.storage.sqlite
            && let Some(parent) = Path::new(&sqlite.path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create SQLite data directory: {}", parent.display())
            })?;
        }

        if let Err(e) = nonce_service::register_metrics() {
            warn!(
                "Prometheus metrics registration warning (may already be registered): {}",
                e
            );
        }

        let service = NonceService::from_config(&config.service_config()).await?;
        let result = Self::dispatch(&service, command).await;

        service.shutdown();
        service.wait_for_sweeper().await;

        // 单次命令结束时输出本进程的指标快照（debug 级别）
        debug!(
            "Prometheus metrics snapshot:\n{}",
            nonce_service::export_metrics()
        );

        result
    }

    /// 执行子命令
    async fn dispatch(service: &NonceService, command: Option<&Commands>) -> Result<()> {
        match command {
            Some(Commands::Issue {
                action,
                user,
                expires_in,
            }) => {
                let nonce = service
                    .issue(action, *user, Duration::from_secs(*expires_in))
                    .await?;
                print_json(&nonce)
            }
            Some(Commands::Check {
                token,
                action,
                user,
            }) => {
                service.check(token, action, *user).await?;
                print_json(&serde_json::json!({ "valid": true }))
            }
            Some(Commands::Consume { token }) => {
                let nonce = service.consume(token).await?;
                print_json(&nonce)
            }
            Some(Commands::Redeem {
                token,
                action,
                user,
            }) => {
                let nonce = service.check_then_consume(token, action, *user).await?;
                print_json(&nonce)
            }
            Some(Commands::Get { action, user }) => {
                let nonce = service.get(action, *user).await?;
                print_json(&nonce)
            }
            Some(Commands::Sweep) => {
                let removed = service.purge_expired().await?;
                print_json(&serde_json::json!({ "removed": removed }))
            }
            Some(Commands::Run) | None => Self::run_until_shutdown(service).await,
            Some(Commands::Test { .. }) => Err(Error::custom(
                "test command does not start the service",
            )),
        }
    }

    /// 常驻运行，直到收到 Ctrl-C
    async fn run_until_shutdown(service: &NonceService) -> Result<()> {
        let stats = service.stats().await?;
        info!(
            "🚀 nonce-keeper running: backend={}, stored nonces={}",
            stats.backend, stats.nonce_count
        );

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        info!("收到Ctrl-C信号，开始优雅关闭...");

        service.shutdown();
        service.wait_for_sweeper().await;

        info!("🛑 nonce-keeper 已安全关闭");
        Ok(())
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
