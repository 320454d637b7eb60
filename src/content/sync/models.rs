//! 同步本地模型定义

use crate::content::story::Story;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 同步元数据（每个客户端一条记录）
///
/// 不变式：`checksums` 的 key 集合与 `items` 的 id 集合完全一致
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    /// 服务器分配的内容版本号
    pub version: u64,
    /// 最近一次成功同步的时间（毫秒）
    pub last_sync_timestamp: i64,
    /// 故事 ID -> 校验和
    #[serde(default)]
    pub checksums: HashMap<String, String>,
    /// 本地缓存的完整故事集合
    #[serde(default)]
    pub items: Vec<Story>,
    /// 资源路径 -> 资源校验和（资源清单）
    #[serde(default)]
    pub asset_checksums: HashMap<String, String>,
}

impl SyncMetadata {
    /// 校验和与故事集合是否一致
    pub fn is_consistent(&self) -> bool {
        self.checksums.len() == self.items.len()
            && self
                .items
                .iter()
                .all(|item| self.checksums.get(&item.id) == Some(&item.checksum))
    }
}

/// 版本戳（内容版本和资源版本独立比较）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionStamp {
    pub content_version: u64,
    pub asset_version: u64,
    pub last_updated: i64,
}

/// 版本检查结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCheck {
    pub needs_content_sync: bool,
    pub needs_asset_sync: bool,
    pub local: Option<VersionStamp>,
    /// 服务器不可达时为 None
    pub server: Option<VersionStamp>,
}

impl VersionCheck {
    /// 服务器不可达
    pub fn is_offline(&self) -> bool {
        self.server.is_none()
    }

    pub fn needs_sync(&self) -> bool {
        self.needs_content_sync || self.needs_asset_sync
    }
}

/// 同步阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    VersionCheck,
    DeltaFetch,
    AssetExtraction,
    CacheFilter,
    UrlSigning,
    Download,
    Commit,
    Done,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::VersionCheck => "版本检查",
            SyncPhase::DeltaFetch => "增量拉取",
            SyncPhase::AssetExtraction => "资源提取",
            SyncPhase::CacheFilter => "缓存过滤",
            SyncPhase::UrlSigning => "URL 签名",
            SyncPhase::Download => "资源下载",
            SyncPhase::Commit => "提交元数据",
            SyncPhase::Done => "完成",
        };
        f.write_str(name)
    }
}

/// 同步进度
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncProgress {
    pub phase: SyncPhase,
    /// 0-100
    pub percent: u8,
    pub message: String,
}

/// 同步结果状态
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// 还没执行完
    #[default]
    Pending,
    /// 服务器不可达，继续使用本地缓存
    Offline,
    /// 版本一致，无需同步
    UpToDate,
    /// 同步完成（可能有部分资源失败，见 `errors`）
    Completed,
    /// 整个阶段失败，本轮没有提交任何元数据
    Failed(String),
}

/// 一次同步的统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub status: SyncStatus,
    /// 同步结束后的本地内容版本
    pub content_version: Option<u64>,
    /// 同步结束后的本地资源版本
    pub asset_version: Option<u64>,
    pub items_updated: usize,
    pub items_deleted: usize,
    pub total_items: usize,
    /// 本轮需要的资源数
    pub assets_total: usize,
    /// 已缓存且有效、无需下载的资源数
    pub assets_cached: usize,
    pub assets_downloaded: usize,
    pub assets_failed: usize,
    pub bytes_downloaded: u64,
    /// 逐项失败原因（签名失败、下载失败）
    pub errors: Vec<String>,
    pub started_at: i64,
    pub finished_at: i64,
}

impl SyncStats {
    /// 用户可读的一句话总结
    pub fn summary(&self) -> String {
        match &self.status {
            SyncStatus::Pending => "同步进行中".to_string(),
            SyncStatus::Offline => "服务器不可达，使用本地缓存内容".to_string(),
            SyncStatus::UpToDate => "内容已是最新".to_string(),
            SyncStatus::Failed(reason) => format!("同步失败: {}", reason),
            SyncStatus::Completed => format!(
                "同步完成：更新 {} 个故事，删除 {} 个，下载 {} 个资源，失败 {} 个",
                self.items_updated, self.items_deleted, self.assets_downloaded, self.assets_failed
            ),
        }
    }
}
