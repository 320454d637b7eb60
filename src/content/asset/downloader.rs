//! 并发下载编排
//!
//! 按固定窗口分块下载：每块内并发，等整块全部结束（无论成败）再报告进度、进入下一块。
//! 单个资源失败只记录到统计里，不影响整批。

use crate::content::asset::cache::DiskAssetCache;
use crate::content::asset::fetcher::AssetFetcher;
use crate::content::asset::memory::MemoryIndex;
use crate::content::asset::path::AssetPath;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 一个下载任务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadEntry {
    pub path: AssetPath,
    pub url: String,
    /// 跳过“已存在”短路，总是重新下载（校验和变化的故事使用）
    pub force: bool,
}

/// 单个资源的失败原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadError {
    pub path: String,
    pub message: String,
}

/// 下载统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub downloaded: usize,
    /// 已缓存且有效而跳过的数量
    pub skipped: usize,
    pub failed: usize,
    pub bytes: u64,
    pub errors: Vec<DownloadError>,
}

/// 下载进度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub completed: usize,
    pub total: usize,
}

enum Outcome {
    Downloaded(u64),
    Skipped,
    Failed(String),
}

/// 并发下载器
pub struct AssetDownloader {
    fetcher: Arc<dyn AssetFetcher>,
    cache: Arc<DiskAssetCache>,
    memory: Arc<MemoryIndex>,
    concurrency: usize,
    timeout: Duration,
}

impl AssetDownloader {
    pub fn new(
        fetcher: Arc<dyn AssetFetcher>,
        cache: Arc<DiskAssetCache>,
        memory: Arc<MemoryIndex>,
        concurrency: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            cache,
            memory,
            concurrency: concurrency.max(1),
            timeout,
        }
    }

    /// 下载全部资源
    pub async fn download_all(
        &self,
        entries: &[DownloadEntry],
        on_progress: &(dyn Fn(DownloadProgress) + Send + Sync),
    ) -> DownloadStats {
        let total = entries.len();
        let mut stats = DownloadStats::default();
        if total == 0 {
            return stats;
        }
        info!(
            "[Downloader] ⬇️ 开始下载 {} 个资源，并发窗口: {}",
            total, self.concurrency
        );

        let mut completed = 0;
        for chunk in entries.chunks(self.concurrency) {
            let outcomes = join_all(chunk.iter().map(|entry| self.download_one(entry))).await;
            for (entry, outcome) in chunk.iter().zip(outcomes) {
                match outcome {
                    Outcome::Downloaded(bytes) => {
                        stats.downloaded += 1;
                        stats.bytes += bytes;
                    }
                    Outcome::Skipped => stats.skipped += 1,
                    Outcome::Failed(message) => {
                        warn!("[Downloader] ❌ {} 下载失败: {}", entry.path, message);
                        stats.failed += 1;
                        stats.errors.push(DownloadError {
                            path: entry.path.as_str().to_string(),
                            message,
                        });
                    }
                }
            }
            completed += chunk.len();
            on_progress(DownloadProgress { completed, total });
        }

        info!(
            "[Downloader] ✅ 下载结束，成功: {}, 跳过: {}, 失败: {}, 字节: {}",
            stats.downloaded, stats.skipped, stats.failed, stats.bytes
        );
        stats
    }

    async fn download_one(&self, entry: &DownloadEntry) -> Outcome {
        if entry.force {
            // 新文件落地前，旧的内存指针不能再被命中
            self.memory.remove(&entry.path);
        } else if let Some(local) = self.cache.cached_valid(&entry.path).await {
            debug!("[Downloader] 已缓存，跳过: {}", entry.path);
            self.memory.insert(entry.path.clone(), local);
            return Outcome::Skipped;
        }

        let bytes = match tokio::time::timeout(self.timeout, self.fetcher.fetch(&entry.url)).await
        {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return Outcome::Failed(e.to_string()),
            Err(_) => return Outcome::Failed(format!("下载超时（{:?}）", self.timeout)),
        };

        let local = match self.cache.write_asset(&entry.path, &bytes).await {
            Ok(local) => local,
            Err(e) => return Outcome::Failed(format!("{:#}", e)),
        };

        let validation = self.cache.validate(&entry.path, &local).await;
        if !validation.valid {
            // 损坏文件不能占着缓存位置
            if let Err(e) = self.cache.remove_asset(&entry.path).await {
                warn!("[Downloader] 删除损坏文件失败 {}: {:#}", entry.path, e);
            }
            return Outcome::Failed(format!(
                "完整性校验失败: {}",
                validation.reason.unwrap_or_default()
            ));
        }

        self.memory.insert(entry.path.clone(), local);
        Outcome::Downloaded(bytes.len() as u64)
    }
}
