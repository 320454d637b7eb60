//! 版本管理：用一次短超时请求判断是否需要同步
//!
//! 本身不写任何东西，版本戳只在同步完整成功后由同步服务写入。

use crate::content::sync::api::ContentApi;
use crate::content::sync::dao::SyncStore;
use crate::content::sync::models::{VersionCheck, VersionStamp};
use crate::content::sync::types::ContentVersionResp;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct VersionManager {
    api: Arc<dyn ContentApi>,
    store: SyncStore,
    timeout: Duration,
}

impl VersionManager {
    pub fn new(api: Arc<dyn ContentApi>, store: SyncStore, timeout: Duration) -> Self {
        Self { api, store, timeout }
    }

    /// 取服务器版本
    ///
    /// 超时或连接失败返回 `Ok(None)`（离线）；服务器返回错误或响应无法解析时返回 `Err`
    pub async fn fetch_server_version(&self) -> Result<Option<ContentVersionResp>> {
        match tokio::time::timeout(self.timeout, self.api.get_version()).await {
            Ok(Ok(resp)) => Ok(Some(resp)),
            Ok(Err(e)) if e.is_unreachable() => {
                warn!("[VersionMgr] 📴 服务器不可达: {}", e);
                Ok(None)
            }
            Ok(Err(e)) => Err(e).context("获取服务器版本失败"),
            Err(_) => {
                warn!("[VersionMgr] ⚠️ 获取服务器版本超时（{:?}）", self.timeout);
                Ok(None)
            }
        }
    }

    /// 读取本地版本戳；同步元数据缺失或损坏时版本戳不可信，按首次同步处理
    async fn load_local_stamp(&self) -> Result<Option<VersionStamp>> {
        let Some(stamp) = self.store.load_version_stamp().await? else {
            return Ok(None);
        };
        if self.store.load_metadata().await?.is_none() {
            warn!(
                "[VersionMgr] ⚠️ 存在版本戳（内容 {}）但同步元数据不可用，按首次同步处理",
                stamp.content_version
            );
            return Ok(None);
        }
        Ok(Some(stamp))
    }

    /// 比较本地和服务器版本
    pub async fn check_versions(&self) -> Result<VersionCheck> {
        let local = self.load_local_stamp().await?;
        let server = self.fetch_server_version().await?.map(|resp| VersionStamp {
            content_version: resp.content_version,
            asset_version: resp.asset_version,
            last_updated: resp.last_updated,
        });
        let check = compare(local, server);
        info!(
            "[VersionMgr] 本地: {:?}, 服务器: {:?}, 需要内容同步: {}, 需要资源同步: {}",
            check.local.map(|s| (s.content_version, s.asset_version)),
            check.server.map(|s| (s.content_version, s.asset_version)),
            check.needs_content_sync,
            check.needs_asset_sync
        );
        Ok(check)
    }
}

/// 纯比较逻辑
pub fn compare(local: Option<VersionStamp>, server: Option<VersionStamp>) -> VersionCheck {
    let (needs_content_sync, needs_asset_sync) = match (&local, &server) {
        // 服务器不可达：不做任何破坏性操作
        (_, None) => (false, false),
        (None, Some(_)) => {
            debug!("[VersionMgr] 本地无版本戳，按首次同步处理");
            (true, true)
        }
        (Some(l), Some(s)) => (
            s.content_version > l.content_version,
            s.asset_version > l.asset_version,
        ),
    };
    VersionCheck {
        needs_content_sync,
        needs_asset_sync,
        local,
        server,
    }
}
