//! 内容客户端
//!
//! 进程内只创建一个实例，持有同步器、解析器、磁盘缓存和本地存储，
//! 由调用方以引用或 clone 的句柄传给需要的地方。

use crate::content::asset::cache::DiskAssetCache;
use crate::content::asset::fetcher::{AssetFetcher, HttpAssetFetcher};
use crate::content::asset::memory::MemoryIndex;
use crate::content::asset::resolver::ImageResolver;
use crate::content::asset::signer::{BatchUrlSigner, SignedUrlBatch};
use crate::content::asset::validator::IntegrityValidator;
use crate::content::bundled::bundled_stories;
use crate::content::config::ContentClientConfig;
use crate::content::db::create_sqlite_pool_with_migration;
use crate::content::story::Story;
use crate::content::sync::api::{build_gateway_client, ContentApi, HttpContentApi};
use crate::content::sync::dao::SyncStore;
use crate::content::sync::listener::{EmptySyncListener, SyncListener};
use crate::content::sync::models::{SyncStats, VersionCheck};
use crate::content::sync::service::{ContentSyncer, SyncerParts};
use crate::content::sync::version::VersionManager;
use anyhow::{Context, Result};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 内容客户端
#[derive(Clone)]
pub struct ContentClient {
    config: ContentClientConfig,
    store: SyncStore,
    signer: Arc<BatchUrlSigner>,
    cache: Arc<DiskAssetCache>,
    memory: Arc<MemoryIndex>,
    versions: Arc<VersionManager>,
    resolver: ImageResolver,
    syncer: ContentSyncer,
}

impl ContentClient {
    /// 创建新的客户端（使用默认空监听器）
    pub async fn new(config: ContentClientConfig) -> Result<Self> {
        Self::with_listener(config, Arc::new(EmptySyncListener)).await
    }

    /// 创建新的客户端（带自定义同步监听器，内部创建连接池和 HTTP 客户端）
    pub async fn with_listener(
        config: ContentClientConfig,
        listener: Arc<dyn SyncListener>,
    ) -> Result<Self> {
        info!(
            "[ContentClient] 创建内容客户端，网关: {}, 数据库: {}",
            config.api_base_url, config.db_url
        );
        let db = create_sqlite_pool_with_migration(&config.db_url).await?;

        let gateway_client = build_gateway_client(&config.token, config.device_id.as_deref())?;
        let api = Arc::new(HttpContentApi::new(
            gateway_client,
            config.api_base_url.clone(),
            config.endpoints.clone(),
            config.tuning.request_timeout,
        ));

        // 签名 URL 自带授权，下载用的客户端不带认证头
        let download_client = reqwest::ClientBuilder::new()
            .build()
            .context("创建下载 HTTP 客户端失败")?;
        let fetcher = Arc::new(HttpAssetFetcher::new(
            download_client,
            config.tuning.download_timeout,
        ));

        Ok(Self::with_parts(config, db, api, fetcher, listener))
    }

    /// 使用外部提供的连接池、网关和下载器组装客户端
    pub fn with_parts(
        config: ContentClientConfig,
        db: Pool<Sqlite>,
        api: Arc<dyn ContentApi>,
        fetcher: Arc<dyn AssetFetcher>,
        listener: Arc<dyn SyncListener>,
    ) -> Self {
        let store = SyncStore::new(db);
        let cache = Arc::new(DiskAssetCache::new(
            config.cache_dir.clone(),
            config.asset_prefix.clone(),
            IntegrityValidator::new(config.tuning.min_asset_bytes),
        ));
        let memory = Arc::new(MemoryIndex::new());
        let signer = Arc::new(BatchUrlSigner::new(
            api.clone(),
            config.asset_prefix.clone(),
            config.tuning.url_batch_size,
        ));
        let resolver = ImageResolver::new(
            memory.clone(),
            cache.clone(),
            fetcher.clone(),
            signer.clone(),
            config.tuning.download_timeout,
        );
        let versions = Arc::new(VersionManager::new(
            api.clone(),
            store.clone(),
            config.tuning.version_timeout,
        ));
        let syncer = ContentSyncer::with_listener(
            SyncerParts {
                api,
                store: store.clone(),
                cache: cache.clone(),
                memory: memory.clone(),
                fetcher,
                signer: signer.clone(),
            },
            config.asset_prefix.clone(),
            &config.tuning,
            listener,
        );
        Self {
            config,
            store,
            signer,
            cache,
            memory,
            versions,
            resolver,
            syncer,
        }
    }

    pub fn config(&self) -> &ContentClientConfig {
        &self.config
    }

    /// 执行一轮同步（同步进行中调用会拿到同一轮结果）
    pub async fn perform_sync(&self) -> Arc<SyncStats> {
        self.syncer.perform_sync().await
    }

    pub fn is_syncing(&self) -> bool {
        self.syncer.is_syncing()
    }

    /// 只做版本比较，不同步
    pub async fn check_versions(&self) -> Result<VersionCheck> {
        self.versions.check_versions().await
    }

    /// 获取故事列表；从未同步过时返回内置故事
    pub async fn get_stories(&self) -> Result<Vec<Story>> {
        match self.store.load_metadata().await? {
            Some(metadata) => {
                debug!("[ContentClient] 返回已同步故事 {} 个", metadata.items.len());
                Ok(metadata.items)
            }
            None => {
                info!("[ContentClient] 尚未同步，使用内置故事");
                bundled_stories()
            }
        }
    }

    /// 按 ID 获取故事
    pub async fn get_story(&self, id: &str) -> Result<Option<Story>> {
        Ok(self
            .get_stories()
            .await?
            .into_iter()
            .find(|story| story.id == id))
    }

    /// 返回一个新的故事值，已缓存的资源引用替换为本地 `file://` URI
    ///
    /// 只查内存和磁盘，不触发下载；存储中的故事不变
    pub async fn resolve_story(&self, id: &str) -> Result<Option<Story>> {
        let Some(story) = self.get_story(id).await? else {
            return Ok(None);
        };
        let mut resolved: HashMap<String, String> = HashMap::new();
        for raw in story.asset_refs() {
            if let Some(uri) = self.local_file_uri(raw).await {
                resolved.insert(raw.to_string(), uri);
            }
        }
        debug!(
            "[ContentClient] 故事 {} 解析本地资源 {}/{}",
            id,
            resolved.len(),
            story.asset_refs().len()
        );
        Ok(Some(story.map_asset_refs(&|raw| resolved.get(raw).cloned())))
    }

    async fn local_file_uri(&self, raw: &str) -> Option<String> {
        let key = self.cache.key(raw).ok()?;
        let local = match self.memory.get(&key) {
            Some(local) => local,
            None => {
                let local = self.cache.cached_valid(&key).await?;
                self.memory.insert(key, local.clone());
                local
            }
        };
        file_uri(&local).await
    }

    /// 解析资源到本地路径（必要时下载）
    pub async fn get_image_uri(&self, source: &str) -> Option<PathBuf> {
        self.resolver.get_image_uri(source).await
    }

    /// 强制刷新资源
    pub async fn refresh_image_uri(&self, source: &str) -> Option<PathBuf> {
        self.resolver.refresh_image_uri(source).await
    }

    /// 只查内存索引
    pub fn get_memory_cached(&self, source: &str) -> Option<PathBuf> {
        self.resolver.get_memory_cached(source)
    }

    /// 为一组原始资源路径批量获取签名 URL；非法路径不发请求，直接计入失败
    pub async fn sign_asset_paths(&self, raw_paths: &[String]) -> SignedUrlBatch {
        self.signer.get_signed_urls_raw(raw_paths).await
    }

    /// 磁盘缓存占用字节数
    pub async fn cache_size(&self) -> Result<u64> {
        self.cache.total_size().await
    }

    /// 清空磁盘缓存、内存索引和本地记录
    pub async fn clear_cache(&self) -> Result<()> {
        if self.syncer.is_syncing() {
            warn!("[ContentClient] 同步进行中清空缓存，本轮同步结果可能引用已删除的资源");
        }
        self.memory.clear();
        self.cache.clear().await?;
        self.store.clear().await?;
        info!("[ContentClient] 🧹 缓存和本地记录已清空");
        Ok(())
    }
}

async fn file_uri(local: &Path) -> Option<String> {
    let absolute = tokio::fs::canonicalize(local).await.ok()?;
    reqwest::Url::from_file_path(&absolute)
        .ok()
        .map(|url| url.to_string())
}
