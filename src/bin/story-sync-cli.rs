//! 内容同步 CLI
//!
//! 非交互式 CLI，用于手动触发同步、查看本地状态、解析单个资源和清空缓存

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use storybook_content_sync::content::sync::SyncListener;
use storybook_content_sync::{
    ContentClient, ContentClientConfig, SyncProgress, SyncStats, SyncStatus,
};
use tracing::{error, info, warn};

/// 内容同步 CLI
#[derive(Parser, Debug)]
#[command(name = "story-sync-cli")]
#[command(about = "故事内容同步 CLI - 增量同步故事和资源到本地缓存", long_about = None)]
struct Args {
    /// 内容网关基础地址
    #[arg(long, default_value = "http://localhost:8080")]
    api_base_url: String,

    /// 认证 token
    #[arg(long, default_value = "")]
    token: String,

    /// 设备 ID
    #[arg(long)]
    device_id: Option<String>,

    /// 本地 SQLite 数据库 URL
    #[arg(long, default_value = "sqlite://content.db?mode=rwc")]
    db_url: String,

    /// 资源缓存目录
    #[arg(long, default_value = "asset-cache")]
    cache_dir: PathBuf,

    /// 日志级别（默认: info,storybook_content_sync=debug）
    #[arg(long, default_value = "info,storybook_content_sync=debug")]
    log_level: String,

    /// 日志文件（追加写入），不指定则只输出到控制台
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 执行一轮同步
    Sync,
    /// 查看本地和服务器版本、故事数和缓存占用
    Status,
    /// 把资源路径或 URL 解析到本地文件（必要时下载）
    Resolve {
        /// 资源逻辑路径或远程 URL
        source: String,
        /// 忽略缓存强制重新下载
        #[arg(long)]
        refresh: bool,
    },
    /// 为资源路径批量获取签名 URL
    Sign {
        /// 资源逻辑路径（可带 `assets/` 前缀）
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// 清空资源缓存和本地同步记录
    ClearCache,
}

/// 初始化日志（输出到 stdout，指定了文件时同时写文件）
fn init_logger(log_level: &str, log_file: Option<&PathBuf>) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    // 文件不需要颜色
    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("无法创建日志文件 {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(false)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    if let Some(path) = log_file {
        info!("[CLI] 📝 日志同时输出到控制台和文件: {}", path.display());
    }
    Ok(())
}

/// 输出同步进度
struct CliSyncListener;

impl SyncListener for CliSyncListener {
    fn on_sync_start(&self) {
        info!("[CLI/Sync] 🔄 同步开始");
    }

    fn on_sync_progress(&self, progress: &SyncProgress) {
        info!(
            "[CLI/Sync] 📊 [{}] {}% {}",
            progress.phase, progress.percent, progress.message
        );
    }

    fn on_sync_finish(&self, stats: &SyncStats) {
        info!("[CLI/Sync] ✅ {}", stats.summary());
    }

    fn on_sync_failed(&self, reason: &str) {
        error!("[CLI/Sync] ❌ 同步失败: {}", reason);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level, args.log_file.as_ref())?;

    let mut config = ContentClientConfig::new(args.api_base_url.clone(), args.token.clone());
    config.device_id = args.device_id.clone();
    config.db_url = args.db_url.clone();
    config.cache_dir = args.cache_dir.clone();

    let client = ContentClient::with_listener(config, Arc::new(CliSyncListener)).await?;

    match args.command {
        Command::Sync => {
            let stats = client.perform_sync().await;
            println!(
                "{}",
                serde_json::to_string_pretty(stats.as_ref()).context("序列化同步统计失败")?
            );
            if let SyncStatus::Failed(reason) = &stats.status {
                anyhow::bail!("同步失败: {}", reason);
            }
        }
        Command::Status => {
            let check = client.check_versions().await?;
            let stories = client.get_stories().await?;
            let cache_size = client.cache_size().await?;
            match check.local {
                Some(local) => println!(
                    "本地版本: 内容 {}, 资源 {}",
                    local.content_version, local.asset_version
                ),
                None => println!("本地版本: 尚未同步（使用内置故事）"),
            }
            match check.server {
                Some(server) => println!(
                    "服务器版本: 内容 {}, 资源 {}",
                    server.content_version, server.asset_version
                ),
                None => println!("服务器版本: 不可达"),
            }
            println!(
                "需要内容同步: {}, 需要资源同步: {}",
                check.needs_content_sync, check.needs_asset_sync
            );
            println!("故事数: {}", stories.len());
            println!("缓存占用: {} 字节", cache_size);
        }
        Command::Resolve { source, refresh } => {
            let resolved = if refresh {
                client.refresh_image_uri(&source).await
            } else {
                client.get_image_uri(&source).await
            };
            match resolved {
                Some(path) => println!("{}", path.display()),
                None => {
                    warn!("[CLI] 无法解析资源: {}", source);
                    anyhow::bail!("无法解析资源: {}", source);
                }
            }
        }
        Command::Sign { paths } => {
            let batch = client.sign_asset_paths(&paths).await;
            for signed in &batch.urls {
                println!("{}\t{}", signed.path, signed.signed_url);
            }
            for failed in &batch.failed {
                warn!("[CLI] 签名失败: {}", failed);
            }
            if !batch.failed.is_empty() {
                anyhow::bail!("{} 个路径签名失败", batch.failed.len());
            }
        }
        Command::ClearCache => {
            client.clear_cache().await?;
            println!("缓存已清空");
        }
    }
    Ok(())
}
