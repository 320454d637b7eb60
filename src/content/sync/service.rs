//! 内容同步服务层
//!
//! 把版本检查、增量合并、资源签名和下载串成一次同步。
//! 同一时刻最多只有一轮同步在执行：同步进行中再次触发，拿到的是同一轮的结果。

use crate::content::asset::cache::DiskAssetCache;
use crate::content::asset::downloader::{AssetDownloader, DownloadEntry};
use crate::content::asset::fetcher::AssetFetcher;
use crate::content::asset::memory::MemoryIndex;
use crate::content::asset::path::AssetPath;
use crate::content::asset::signer::BatchUrlSigner;
use crate::content::config::SyncTuning;
use crate::content::serialization::now_millis;
use crate::content::story::{collect_asset_paths, Story};
use crate::content::sync::api::ContentApi;
use crate::content::sync::dao::SyncStore;
use crate::content::sync::delta::{merge_delta, DeltaSyncEngine, MergeOutcome};
use crate::content::sync::listener::{EmptySyncListener, SyncListener};
use crate::content::sync::models::{
    SyncPhase, SyncProgress, SyncStats, SyncStatus, VersionStamp,
};
use crate::content::sync::version::VersionManager;
use anyhow::Result;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

type SharedSync = Shared<BoxFuture<'static, Arc<SyncStats>>>;

/// 同步器依赖的组件（由客户端统一创建，和解析器共享缓存与签名器）
pub struct SyncerParts {
    pub api: Arc<dyn ContentApi>,
    pub store: SyncStore,
    pub cache: Arc<DiskAssetCache>,
    pub memory: Arc<MemoryIndex>,
    pub fetcher: Arc<dyn AssetFetcher>,
    pub signer: Arc<BatchUrlSigner>,
}

struct SyncerInner {
    api: Arc<dyn ContentApi>,
    store: SyncStore,
    versions: VersionManager,
    delta: DeltaSyncEngine,
    signer: Arc<BatchUrlSigner>,
    downloader: AssetDownloader,
    cache: Arc<DiskAssetCache>,
    memory: Arc<MemoryIndex>,
    asset_prefix: String,
    listener: Arc<dyn SyncListener>,
    in_flight: Mutex<Option<SharedSync>>,
}

/// 内容同步器（可廉价 clone，所有 clone 共享同一把“同步中”锁）
#[derive(Clone)]
pub struct ContentSyncer {
    inner: Arc<SyncerInner>,
}

impl ContentSyncer {
    /// 创建新的同步器（使用默认空监听器）
    pub fn new(parts: SyncerParts, asset_prefix: String, tuning: &SyncTuning) -> Self {
        Self::with_listener(parts, asset_prefix, tuning, Arc::new(EmptySyncListener))
    }

    /// 创建新的同步器（带自定义监听器）
    pub fn with_listener(
        parts: SyncerParts,
        asset_prefix: String,
        tuning: &SyncTuning,
        listener: Arc<dyn SyncListener>,
    ) -> Self {
        let SyncerParts {
            api,
            store,
            cache,
            memory,
            fetcher,
            signer,
        } = parts;
        info!(
            "[ContentSync] 创建同步器，缓存目录: {}, 下载窗口: {}",
            cache.root().display(),
            tuning.download_concurrency
        );
        Self {
            inner: Arc::new(SyncerInner {
                versions: VersionManager::new(api.clone(), store.clone(), tuning.version_timeout),
                delta: DeltaSyncEngine::new(api.clone()),
                downloader: AssetDownloader::new(
                    fetcher,
                    cache.clone(),
                    memory.clone(),
                    tuning.download_concurrency,
                    tuning.download_timeout,
                ),
                api,
                store,
                signer,
                cache,
                memory,
                asset_prefix,
                listener,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// 是否有同步正在进行
    pub fn is_syncing(&self) -> bool {
        self.inner
            .in_flight
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// 执行一轮同步；同步进行中调用会拿到同一轮的结果
    ///
    /// 失败不会以错误返回，而是体现在 `SyncStats::status` 中
    pub async fn perform_sync(&self) -> Arc<SyncStats> {
        self.start_or_join().await
    }

    fn start_or_join(&self) -> SharedSync {
        let mut slot = match self.inner.in_flight.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(running) = slot.as_ref() {
            info!("[ContentSync] 已有同步在进行，复用同一轮结果");
            return running.clone();
        }

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let stats = Arc::new(inner.run().await);
            if let Ok(mut slot) = inner.in_flight.lock() {
                *slot = None;
            }
            stats
        });
        let shared = async move {
            match handle.await {
                Ok(stats) => stats,
                Err(e) => {
                    error!("[ContentSync] ❌ 同步任务异常退出: {}", e);
                    Arc::new(SyncStats {
                        status: SyncStatus::Failed(format!("同步任务异常退出: {}", e)),
                        ..Default::default()
                    })
                }
            }
        }
        .boxed()
        .shared();
        *slot = Some(shared.clone());
        shared
    }
}

impl SyncerInner {
    async fn run(&self) -> SyncStats {
        let mut stats = SyncStats {
            started_at: now_millis(),
            ..Default::default()
        };
        info!("[ContentSync] 🔄 开始同步");
        self.listener.on_sync_start();

        if let Err(e) = self.run_phases(&mut stats).await {
            let reason = format!("{:#}", e);
            error!("[ContentSync] ❌ 同步失败，本轮未提交: {}", reason);
            stats.status = SyncStatus::Failed(reason.clone());
            self.listener.on_sync_failed(&reason);
        }

        stats.finished_at = now_millis();
        let summary = stats.summary();
        info!(
            "[ContentSync] ✅ {}（耗时 {} ms）",
            summary,
            stats.finished_at - stats.started_at
        );
        self.report(SyncPhase::Done, 100, summary);
        self.listener.on_sync_finish(&stats);
        stats
    }

    fn report(&self, phase: SyncPhase, percent: u8, message: impl Into<String>) {
        let progress = SyncProgress {
            phase,
            percent,
            message: message.into(),
        };
        debug!(
            "[ContentSync] [{}] {}% {}",
            progress.phase, progress.percent, progress.message
        );
        self.listener.on_sync_progress(&progress);
    }

    async fn run_phases(&self, stats: &mut SyncStats) -> Result<()> {
        self.report(SyncPhase::VersionCheck, 0, "检查版本");
        let check = self.versions.check_versions().await?;
        let Some(server) = check.server else {
            info!("[ContentSync] 📴 服务器不可达，使用本地缓存内容");
            stats.status = SyncStatus::Offline;
            stats.content_version = check.local.map(|s| s.content_version);
            stats.asset_version = check.local.map(|s| s.asset_version);
            return Ok(());
        };
        if !check.needs_sync() {
            info!("[ContentSync] 内容已是最新");
            stats.status = SyncStatus::UpToDate;
            stats.content_version = check.local.map(|s| s.content_version);
            stats.asset_version = check.local.map(|s| s.asset_version);
            return Ok(());
        }
        let local_stamp = check.local.unwrap_or_default();
        let mut metadata = self.store.load_metadata().await?.unwrap_or_default();
        let mut content_version = local_stamp.content_version;
        let mut forced: HashSet<AssetPath> = HashSet::new();

        if check.needs_content_sync {
            self.report(SyncPhase::DeltaFetch, 10, "拉取变化的故事");
            let resp = self
                .delta
                .fetch_delta(metadata.version, &metadata.checksums)
                .await?;
            let outcome = merge_delta(&metadata, &resp)?;
            stats.items_updated = outcome.updated_ids().len();
            stats.items_deleted = outcome.removed.len();
            self.invalidate_stale_assets(&outcome).await;

            // 校验和变化的故事：新版本引用的资源一律重新下载
            let replaced_ids: HashSet<&str> =
                outcome.replaced.iter().map(|s| s.id.as_str()).collect();
            forced.extend(collect_asset_paths(
                outcome
                    .metadata
                    .items
                    .iter()
                    .filter(|s| replaced_ids.contains(s.id.as_str())),
                &self.asset_prefix,
            ));
            if outcome.missing.is_empty() {
                content_version = resp.server_version;
            } else {
                warn!(
                    "[ContentSync] ⚠️ {} 个故事未能取回，内容版本保持 {}",
                    outcome.missing.len(),
                    content_version
                );
                stats.errors.extend(
                    outcome
                        .missing
                        .iter()
                        .map(|id| format!("{}: 服务器未返回该故事", id)),
                );
            }
            metadata = outcome.metadata;
        }

        let mut manifest_ok = true;
        if check.needs_asset_sync {
            match self.api.get_asset_version().await {
                Ok(manifest) => {
                    let fresh = self.canonical_manifest(&manifest.asset_checksums);
                    let changed = changed_assets(&metadata.asset_checksums, &fresh);
                    info!(
                        "[ContentSync] 资源清单版本: {}, 资源数: {}, 校验和变化: {}",
                        manifest.version,
                        fresh.len(),
                        changed.len()
                    );
                    for path in changed {
                        if let Ok(path) = AssetPath::parse(&path, &self.asset_prefix) {
                            forced.insert(path);
                        }
                    }
                    metadata.asset_checksums = fresh;
                }
                Err(e) => {
                    warn!("[ContentSync] ⚠️ 获取资源清单失败，只下载缺失资源: {}", e);
                    stats.errors.push(format!("资源清单: {}", e));
                    manifest_ok = false;
                }
            }
        }

        self.report(SyncPhase::AssetExtraction, 30, "提取资源路径");
        let paths = collect_asset_paths(&metadata.items, &self.asset_prefix);
        stats.assets_total = paths.len();

        self.report(
            SyncPhase::CacheFilter,
            40,
            format!("检查 {} 个资源的本地缓存", paths.len()),
        );
        let mut pending: Vec<(AssetPath, bool)> = Vec::new();
        for path in paths {
            let force = forced.contains(&path);
            if !force {
                if let Some(local) = self.cache.cached_valid(&path).await {
                    self.memory.insert(path, local);
                    stats.assets_cached += 1;
                    continue;
                }
            }
            pending.push((path, force));
        }

        let mut url_failures = 0;
        let mut entries = Vec::with_capacity(pending.len());
        if !pending.is_empty() {
            self.report(
                SyncPhase::UrlSigning,
                50,
                format!("为 {} 个资源获取签名 URL", pending.len()),
            );
            let to_sign: Vec<AssetPath> = pending.iter().map(|(p, _)| p.clone()).collect();
            let batch = self.signer.get_signed_urls(&to_sign).await;
            url_failures = batch.failed.len();
            stats
                .errors
                .extend(batch.failed.iter().map(|p| format!("{}: 获取签名 URL 失败", p)));
            let urls: HashMap<AssetPath, String> = batch
                .urls
                .into_iter()
                .map(|u| (u.path, u.signed_url))
                .collect();
            entries.extend(pending.into_iter().filter_map(|(path, force)| {
                urls.get(&path).map(|url| DownloadEntry {
                    url: url.clone(),
                    path,
                    force,
                })
            }));
        }

        self.report(
            SyncPhase::Download,
            60,
            format!("下载 {} 个资源", entries.len()),
        );
        let listener = &self.listener;
        let download = self
            .downloader
            .download_all(&entries, &|p| {
                let percent = 60 + (p.completed * 35 / p.total.max(1)) as u8;
                listener.on_sync_progress(&SyncProgress {
                    phase: SyncPhase::Download,
                    percent,
                    message: format!("已完成 {}/{}", p.completed, p.total),
                });
            })
            .await;
        stats.assets_downloaded = download.downloaded;
        stats.assets_cached += download.skipped;
        stats.assets_failed = download.failed + url_failures;
        stats.bytes_downloaded = download.bytes;
        stats.errors.extend(
            download
                .errors
                .into_iter()
                .map(|e| format!("{}: {}", e.path, e.message)),
        );

        self.report(SyncPhase::Commit, 95, "提交同步元数据");
        // 资源有缺失时不推进资源版本，下一轮会再补
        let asset_version = if check.needs_asset_sync && manifest_ok && stats.assets_failed == 0 {
            server.asset_version
        } else {
            local_stamp.asset_version
        };
        metadata.last_sync_timestamp = now_millis();
        let stamp = VersionStamp {
            content_version,
            asset_version,
            last_updated: server.last_updated,
        };
        self.store.commit(&metadata, &stamp).await?;

        stats.status = SyncStatus::Completed;
        stats.content_version = Some(stamp.content_version);
        stats.asset_version = Some(stamp.asset_version);
        stats.total_items = metadata.items.len();
        Ok(())
    }

    /// 让旧版本故事引用的资源失效
    ///
    /// 更新的故事：旧引用全部删除（路径不变内容也可能变）；
    /// 删除的故事：只删除不再被任何剩余故事引用的资源
    async fn invalidate_stale_assets(&self, outcome: &MergeOutcome) {
        let surviving: HashSet<AssetPath> = source_keys(&outcome.metadata.items, &self.asset_prefix);
        let mut stale = source_keys(&outcome.replaced, &self.asset_prefix);
        stale.extend(
            source_keys(&outcome.removed, &self.asset_prefix)
                .into_iter()
                .filter(|p| !surviving.contains(p)),
        );
        if stale.is_empty() {
            return;
        }
        info!("[ContentSync] 🧹 失效 {} 个旧资源", stale.len());
        for path in stale {
            self.memory.remove(&path);
            if let Err(e) = self.cache.remove_asset(&path).await {
                warn!("[ContentSync] 删除旧资源失败 {}: {:#}", path, e);
            }
        }
    }

    fn canonical_manifest(&self, raw: &HashMap<String, String>) -> HashMap<String, String> {
        raw.iter()
            .filter_map(|(path, sum)| match AssetPath::parse(path, &self.asset_prefix) {
                Ok(p) => Some((p.as_str().to_string(), sum.clone())),
                Err(e) => {
                    warn!("[ContentSync] 资源清单含非法路径 {:?}: {}", path, e);
                    None
                }
            })
            .collect()
    }
}

/// 故事引用的全部资源 key（含直接写成 URL 的引用）
fn source_keys(stories: &[Story], prefix: &str) -> HashSet<AssetPath> {
    stories
        .iter()
        .flat_map(|s| s.asset_refs())
        .filter_map(|raw| AssetPath::from_source(raw, prefix).ok())
        .collect()
}

/// 两份清单中都存在且校验和不同的资源
fn changed_assets(old: &HashMap<String, String>, fresh: &HashMap<String, String>) -> Vec<String> {
    fresh
        .iter()
        .filter(|(path, sum)| old.get(*path).is_some_and(|prev| prev != *sum))
        .map(|(path, _)| path.clone())
        .collect()
}
