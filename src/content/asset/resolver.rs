//! 资源解析：内存索引 + 进行中请求去重
//!
//! 查找顺序：内存索引 -> 进行中的同一资源请求 -> 磁盘缓存 -> 网络下载。
//! 多个调用方同时请求同一个未缓存资源时，只发起一次下载，所有调用方拿到同一个结果。

use crate::content::asset::cache::DiskAssetCache;
use crate::content::asset::fetcher::AssetFetcher;
use crate::content::asset::memory::MemoryIndex;
use crate::content::asset::path::{is_remote_url, AssetPath};
use crate::content::asset::signer::BatchUrlSigner;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

type InFlight = Shared<BoxFuture<'static, Option<PathBuf>>>;

struct ResolverInner {
    memory: Arc<MemoryIndex>,
    cache: Arc<DiskAssetCache>,
    fetcher: Arc<dyn AssetFetcher>,
    signer: Arc<BatchUrlSigner>,
    download_timeout: Duration,
    in_flight: Mutex<HashMap<AssetPath, InFlight>>,
}

/// 资源解析器（可廉价 clone，内部共享同一份状态）
#[derive(Clone)]
pub struct ImageResolver {
    inner: Arc<ResolverInner>,
}

impl ImageResolver {
    pub fn new(
        memory: Arc<MemoryIndex>,
        cache: Arc<DiskAssetCache>,
        fetcher: Arc<dyn AssetFetcher>,
        signer: Arc<BatchUrlSigner>,
        download_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                memory,
                cache,
                fetcher,
                signer,
                download_timeout,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// 只查内存索引（同步、O(1)）
    pub fn get_memory_cached(&self, source: &str) -> Option<PathBuf> {
        let key = self.inner.cache.key(source).ok()?;
        self.inner.memory.get(&key)
    }

    /// 解析资源到本地路径；失败返回 None
    pub async fn get_image_uri(&self, source: &str) -> Option<PathBuf> {
        let key = match self.inner.cache.key(source) {
            Ok(key) => key,
            Err(e) => {
                warn!("[Resolver] 无法解析资源 {:?}: {}", source, e);
                return None;
            }
        };
        if let Some(local) = self.inner.memory.get(&key) {
            return Some(local);
        }
        self.join_or_start(key, source.to_string(), false).await
    }

    /// 强制从网络刷新；下载失败时，只要旧文件仍通过校验就继续使用旧文件
    pub async fn refresh_image_uri(&self, source: &str) -> Option<PathBuf> {
        let key = match self.inner.cache.key(source) {
            Ok(key) => key,
            Err(e) => {
                warn!("[Resolver] 无法解析资源 {:?}: {}", source, e);
                return None;
            }
        };
        self.join_or_start(key, source.to_string(), true).await
    }

    /// 让某个资源失效（内存 + 磁盘）
    pub async fn invalidate(&self, key: &AssetPath) {
        self.inner.memory.remove(key);
        if let Err(e) = self.inner.cache.remove_asset(key).await {
            warn!("[Resolver] 删除缓存失败 {}: {:#}", key, e);
        }
    }

    /// 检查并登记进行中请求；查找和登记之间没有 await
    fn join_or_start(&self, key: AssetPath, source: String, force: bool) -> InFlight {
        let Ok(mut in_flight) = self.inner.in_flight.lock() else {
            let inner = self.inner.clone();
            return async move { resolve(inner, key, source, force).await }
                .boxed()
                .shared();
        };
        if let Some(existing) = in_flight.get(&key) {
            debug!("[Resolver] 复用进行中的请求: {}", key);
            return existing.clone();
        }

        let inner = self.inner.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let result = resolve(inner.clone(), task_key.clone(), source, force).await;
            if let Ok(mut map) = inner.in_flight.lock() {
                map.remove(&task_key);
            }
            result
        });
        let shared = async move { handle.await.ok().flatten() }.boxed().shared();
        in_flight.insert(key, shared.clone());
        shared
    }
}

async fn resolve(
    inner: Arc<ResolverInner>,
    key: AssetPath,
    source: String,
    force: bool,
) -> Option<PathBuf> {
    if !force {
        if let Some(local) = inner.cache.cached_valid(&key).await {
            inner.memory.insert(key, local.clone());
            return Some(local);
        }
    }

    match download(&inner, &key, &source).await {
        Ok(local) => {
            info!("[Resolver] ✅ 已下载 {}", key);
            inner.memory.insert(key, local.clone());
            Some(local)
        }
        Err(reason) => {
            warn!("[Resolver] ❌ 获取 {} 失败: {}", key, reason);
            if force {
                // 旧文件只要没被校验判定损坏就继续用
                if let Some(stale) = inner.cache.cached_valid(&key).await {
                    info!("[Resolver] 使用旧缓存: {}", key);
                    inner.memory.insert(key, stale.clone());
                    return Some(stale);
                }
            }
            None
        }
    }
}

async fn download(inner: &ResolverInner, key: &AssetPath, source: &str) -> Result<PathBuf, String> {
    let url = if is_remote_url(source) {
        source.to_string()
    } else {
        inner
            .signer
            .get_signed_url(key)
            .await
            .map(|signed| signed.signed_url)
            .ok_or_else(|| "无法获取签名 URL".to_string())?
    };

    let bytes = tokio::time::timeout(inner.download_timeout, inner.fetcher.fetch(&url))
        .await
        .map_err(|_| format!("下载超时（{:?}）", inner.download_timeout))?
        .map_err(|e| e.to_string())?;

    let local = inner
        .cache
        .write_asset(key, &bytes)
        .await
        .map_err(|e| format!("{:#}", e))?;
    let validation = inner.cache.validate(key, &local).await;
    if !validation.valid {
        if let Err(e) = inner.cache.remove_asset(key).await {
            warn!("[Resolver] 删除损坏文件失败 {}: {:#}", key, e);
        }
        return Err(format!(
            "完整性校验失败: {}",
            validation.reason.unwrap_or_default()
        ));
    }
    Ok(local)
}
