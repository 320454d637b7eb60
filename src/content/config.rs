//! 内容同步客户端配置

use std::path::PathBuf;
use std::time::Duration;

/// 资源路径的固定前缀，作为缓存 key 前需要去掉
pub const DEFAULT_ASSET_PREFIX: &str = "assets/";

/// 单次签名 URL 批量请求的最大路径数
pub const DEFAULT_URL_BATCH_SIZE: usize = 50;

/// 下载并发窗口大小
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 5;

/// 低于该字节数的已知格式文件一律视为损坏
pub const DEFAULT_MIN_ASSET_BYTES: u64 = 100;

/// 内容网关各接口路径
#[derive(Clone, Debug)]
pub struct GatewayEndpoints {
    /// 内容版本（GET）
    pub version: String,
    /// 增量同步（POST）
    pub delta: String,
    /// 批量签名 URL（POST）
    pub batch_urls: String,
    /// 资源版本清单（GET）
    pub asset_version: String,
}

impl Default for GatewayEndpoints {
    fn default() -> Self {
        Self {
            version: "/api/stories/version".to_string(),
            delta: "/api/stories/delta".to_string(),
            batch_urls: "/api/assets/batch-urls".to_string(),
            asset_version: "/api/assets/version".to_string(),
        }
    }
}

/// 同步调优参数
#[derive(Clone, Debug)]
pub struct SyncTuning {
    /// 版本检查超时，需要比普通请求短，服务器慢时尽快放弃
    pub version_timeout: Duration,
    /// 普通网关请求超时
    pub request_timeout: Duration,
    /// 单个资源下载超时
    pub download_timeout: Duration,
    /// 批量签名 URL 的分块大小
    pub url_batch_size: usize,
    /// 下载并发窗口
    pub download_concurrency: usize,
    /// 已知格式资源的最小字节数
    pub min_asset_bytes: u64,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            version_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(60),
            url_batch_size: DEFAULT_URL_BATCH_SIZE,
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            min_asset_bytes: DEFAULT_MIN_ASSET_BYTES,
        }
    }
}

/// 客户端配置
#[derive(Clone, Debug)]
pub struct ContentClientConfig {
    /// 内容网关基础地址
    pub api_base_url: String,
    /// 认证 token（以 Bearer 方式附加到每个网关请求）
    pub token: String,
    /// 设备 ID，可选
    pub device_id: Option<String>,
    /// 本地 SQLite 数据库 URL
    ///
    /// 例如：`sqlite://content.db?mode=rwc`
    pub db_url: String,
    /// 资源磁盘缓存根目录
    pub cache_dir: PathBuf,
    /// 资源路径前缀
    pub asset_prefix: String,
    /// 接口路径
    pub endpoints: GatewayEndpoints,
    /// 调优参数
    pub tuning: SyncTuning,
}

impl ContentClientConfig {
    /// 创建默认配置
    pub fn new(api_base_url: String, token: String) -> Self {
        Self {
            api_base_url,
            token,
            device_id: None,
            db_url: "sqlite://content.db?mode=rwc".to_string(),
            cache_dir: PathBuf::from("asset-cache"),
            asset_prefix: DEFAULT_ASSET_PREFIX.to_string(),
            endpoints: GatewayEndpoints::default(),
            tuning: SyncTuning::default(),
        }
    }
}
