//! 资源磁盘缓存
//!
//! 以规范化后的 `AssetPath` 为 key，文件落在缓存根目录下的确定性路径。

use crate::content::asset::path::{AssetPath, InvalidAssetPath};
use crate::content::asset::validator::{IntegrityValidator, ValidationResult};
use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 磁盘资源缓存
#[derive(Debug, Clone)]
pub struct DiskAssetCache {
    root: PathBuf,
    prefix: String,
    validator: IntegrityValidator,
}

impl DiskAssetCache {
    pub fn new(root: PathBuf, prefix: String, validator: IntegrityValidator) -> Self {
        Self {
            root,
            prefix,
            validator,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 把任意来源的路径规范化为缓存 key
    pub fn key(&self, source: &str) -> Result<AssetPath, InvalidAssetPath> {
        AssetPath::from_source(source, &self.prefix)
    }

    pub fn local_path(&self, path: &AssetPath) -> PathBuf {
        path.to_local_path(&self.root)
    }

    /// 缓存文件是否存在（不做校验）
    pub async fn has_asset(&self, path: &AssetPath) -> bool {
        tokio::fs::metadata(self.local_path(path))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// 存在则返回本地路径
    pub async fn get_asset_uri(&self, path: &AssetPath) -> Option<PathBuf> {
        if self.has_asset(path).await {
            Some(self.local_path(path))
        } else {
            None
        }
    }

    /// 按资源路径的扩展名校验本地文件
    pub async fn validate(&self, path: &AssetPath, local_path: &Path) -> ValidationResult {
        self.validator
            .validate(local_path, path.extension().as_deref())
            .await
    }

    /// 缓存中存在且通过校验；校验失败的文件会被删除，视为未命中
    pub async fn cached_valid(&self, path: &AssetPath) -> Option<PathBuf> {
        let local = self.get_asset_uri(path).await?;
        let result = self.validate(path, &local).await;
        if result.valid {
            return Some(local);
        }
        warn!(
            "[AssetCache] 缓存文件损坏，删除: {} ({})",
            path,
            result.reason.unwrap_or_default()
        );
        if let Err(e) = self.remove_asset(path).await {
            warn!("[AssetCache] 删除损坏文件失败 {}: {:#}", path, e);
        }
        None
    }

    /// 写入资源：先写临时文件再 rename，避免留下半截文件
    pub async fn write_asset(&self, path: &AssetPath, bytes: &[u8]) -> Result<PathBuf> {
        let target = self.local_path(path);
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        tokio::fs::create_dir_all(&parent)
            .await
            .with_context(|| format!("创建缓存目录失败: {}", parent.display()))?;

        let file_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("asset");
        let tmp = parent.join(format!(".{}.{}.part", file_name, Uuid::new_v4()));
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("写入临时文件失败: {}", tmp.display()))?;
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("替换缓存文件失败: {}", target.display()));
        }
        debug!("[AssetCache] 已写入 {} ({} 字节)", path, bytes.len());
        Ok(target)
    }

    /// 删除资源；文件不存在也视为成功
    pub async fn remove_asset(&self, path: &AssetPath) -> Result<()> {
        let local = self.local_path(path);
        match tokio::fs::remove_file(&local).await {
            Ok(()) => {
                debug!("[AssetCache] 已删除 {}", path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("删除缓存文件失败: {}", local.display())),
        }
    }

    /// 缓存占用的总字节数
    pub async fn total_size(&self) -> Result<u64> {
        let mut total = 0u64;
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(e).with_context(|| format!("读取缓存目录失败: {}", dir.display()))
                }
            };
            while let Some(entry) = entries.next_entry().await? {
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    stack.push(entry.path());
                } else {
                    total += meta.len();
                }
            }
        }
        Ok(total)
    }

    /// 清空整个缓存目录
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {
                info!("[AssetCache] 缓存已清空: {}", self.root.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("清空缓存目录失败: {}", self.root.display()))
            }
        }
    }
}
