//! 批量签名 URL
//!
//! 把资源路径按固定大小分块，每块一次请求，避免每个资源一次往返。
//! 某一块失败不影响其他块，失败路径通过 `failed` 返回而不是报错。

use crate::content::asset::path::AssetPath;
use crate::content::sync::api::ContentApi;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 一条签名 URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    pub path: AssetPath,
    pub signed_url: String,
    pub expires_at: i64,
}

/// 批量签名结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedUrlBatch {
    pub urls: Vec<SignedUrl>,
    pub failed: Vec<String>,
}

/// 批量签名器
pub struct BatchUrlSigner {
    api: Arc<dyn ContentApi>,
    prefix: String,
    batch_size: usize,
}

impl BatchUrlSigner {
    pub fn new(api: Arc<dyn ContentApi>, prefix: String, batch_size: usize) -> Self {
        Self {
            api,
            prefix,
            batch_size: batch_size.max(1),
        }
    }

    /// 原始路径版本：先规范化，非法路径直接计入失败，不发请求
    pub async fn get_signed_urls_raw(&self, raw_paths: &[String]) -> SignedUrlBatch {
        let mut valid = Vec::with_capacity(raw_paths.len());
        let mut rejected = Vec::new();
        for raw in raw_paths {
            match AssetPath::parse(raw, &self.prefix) {
                Ok(p) => valid.push(p),
                Err(e) => {
                    warn!("[BatchSigner] 拒绝非法路径 {:?}: {}", raw, e);
                    rejected.push(raw.clone());
                }
            }
        }
        let mut batch = self.get_signed_urls(&valid).await;
        batch.failed.extend(rejected);
        batch
    }

    /// 获取一组资源的签名 URL
    pub async fn get_signed_urls(&self, paths: &[AssetPath]) -> SignedUrlBatch {
        let mut seen = HashSet::new();
        let unique: Vec<&AssetPath> = paths.iter().filter(|p| seen.insert(*p)).collect();
        let mut result = SignedUrlBatch::default();
        if unique.is_empty() {
            return result;
        }

        let total_batches = unique.len().div_ceil(self.batch_size);
        info!(
            "[BatchSigner] 📡 请求签名 URL，路径数: {}, 分 {} 批",
            unique.len(),
            total_batches
        );

        for (index, chunk) in unique.chunks(self.batch_size).enumerate() {
            let wire: Vec<String> = chunk.iter().map(|p| p.as_str().to_string()).collect();
            match self.api.batch_urls(&wire).await {
                Ok(resp) => {
                    let requested: HashSet<&AssetPath> = chunk.iter().copied().collect();
                    let mut answered = HashSet::new();
                    for entry in resp.urls {
                        let Ok(path) = AssetPath::parse(&entry.path, &self.prefix) else {
                            warn!("[BatchSigner] 响应中含非法路径: {}", entry.path);
                            continue;
                        };
                        if !requested.contains(&path) || !answered.insert(path.clone()) {
                            debug!("[BatchSigner] 忽略未请求或重复的路径: {}", entry.path);
                            continue;
                        }
                        result.urls.push(SignedUrl {
                            path,
                            signed_url: entry.signed_url,
                            expires_at: entry.expires_at,
                        });
                    }
                    // 服务器既没签也没报失败的路径同样算失败
                    for p in chunk {
                        if !answered.contains(*p) {
                            result.failed.push(p.as_str().to_string());
                        }
                    }
                    debug!(
                        "[BatchSigner] 第 {}/{} 批完成，成功 {}",
                        index + 1,
                        total_batches,
                        answered.len()
                    );
                }
                Err(e) => {
                    warn!(
                        "[BatchSigner] 第 {}/{} 批请求失败（{} 个路径）: {}",
                        index + 1,
                        total_batches,
                        chunk.len(),
                        e
                    );
                    result.failed.extend(wire);
                }
            }
        }

        info!(
            "[BatchSigner] ✅ 签名完成，成功: {}, 失败: {}",
            result.urls.len(),
            result.failed.len()
        );
        result
    }

    /// 单个路径的便捷版本（走同一个批量接口）
    pub async fn get_signed_url(&self, path: &AssetPath) -> Option<SignedUrl> {
        self.get_signed_urls(std::slice::from_ref(path))
            .await
            .urls
            .into_iter()
            .next()
    }
}
