//! 资源逻辑路径（AssetPath）
//!
//! 同一份资源可能以 `assets/stories/a/cover.webp` 或 `stories/a/cover.webp`
//! 两种形式出现，也可能以签名 URL 的形式出现。所有使用方都必须先规范化为
//! `AssetPath` 再作为缓存 key，否则缓存会悄悄未命中。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// 网关允许的资源根目录（用于从 URL 中定位对象路径）
pub const KNOWN_ASSET_ROOTS: &[&str] = &["stories", "images", "audio", "thumbnails"];

/// 非法资源路径
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidAssetPath {
    #[error("资源路径为空")]
    Empty,
    #[error("资源路径包含目录穿越: {0}")]
    Traversal(String),
    #[error("资源路径不能是绝对路径: {0}")]
    Absolute(String),
    #[error("资源路径包含非法字符: {0}")]
    IllegalChar(String),
    #[error("无法从 URL 解析资源路径: {0}")]
    BadUrl(String),
}

/// 规范化后的资源路径（已去掉固定前缀），可直接作为缓存 key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetPath(String);

/// 是否为 http(s) 远程地址
pub fn is_remote_url(source: &str) -> bool {
    let lower = source.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

impl AssetPath {
    /// 解析逻辑路径，去掉 `prefix` 并做安全检查
    pub fn parse(raw: &str, prefix: &str) -> Result<Self, InvalidAssetPath> {
        let trimmed = raw.trim();
        if trimmed.contains('\0') || trimmed.contains('\\') {
            return Err(InvalidAssetPath::IllegalChar(trimmed.replace('\0', "\\0")));
        }
        if trimmed.starts_with('/') {
            return Err(InvalidAssetPath::Absolute(trimmed.to_string()));
        }

        let prefix = prefix.trim_matches('/');
        let mut segments: Vec<&str> = trimmed
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();
        if !prefix.is_empty() && segments.first() == Some(&prefix) {
            segments.remove(0);
        }
        if segments.iter().any(|s| *s == "..") {
            return Err(InvalidAssetPath::Traversal(trimmed.to_string()));
        }
        if segments.is_empty() {
            return Err(InvalidAssetPath::Empty);
        }
        Ok(Self(segments.join("/")))
    }

    /// 从远程 URL（签名 URL、CDN 地址、模拟器地址）中提取资源路径
    ///
    /// 查询参数（签名、过期时间）不参与 key，否则每次签名都会产生新的缓存项
    pub fn from_url(url: &str, prefix: &str) -> Result<Self, InvalidAssetPath> {
        let parsed =
            reqwest::Url::parse(url.trim()).map_err(|_| InvalidAssetPath::BadUrl(url.to_string()))?;
        let segments: Vec<String> = parsed
            .path_segments()
            .map(|it| {
                it.filter(|s| !s.is_empty())
                    // 对象名整体编码在一个 segment 里的情况（如 `o/stories%2Fa%2Fcover.webp`）
                    .flat_map(|s| {
                        s.replace("%2F", "/")
                            .replace("%2f", "/")
                            .split('/')
                            .map(str::to_string)
                            .collect::<Vec<_>>()
                    })
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let prefix_segment = prefix.trim_matches('/');
        let start = segments
            .iter()
            .position(|s| !prefix_segment.is_empty() && s == prefix_segment)
            .map(|i| i + 1)
            .or_else(|| {
                segments
                    .iter()
                    .position(|s| KNOWN_ASSET_ROOTS.contains(&s.as_str()))
            })
            .unwrap_or(0);

        let joined = segments[start.min(segments.len())..].join("/");
        Self::parse(&joined, prefix)
            .map_err(|e| match e {
                InvalidAssetPath::Empty => InvalidAssetPath::BadUrl(url.to_string()),
                other => other,
            })
    }

    /// 任意来源（逻辑路径或 URL）统一规范化
    pub fn from_source(source: &str, prefix: &str) -> Result<Self, InvalidAssetPath> {
        if is_remote_url(source) {
            Self::from_url(source, prefix)
        } else {
            Self::parse(source, prefix)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 小写扩展名
    pub fn extension(&self) -> Option<String> {
        let file_name = self.0.rsplit('/').next()?;
        let (_, ext) = file_name.rsplit_once('.')?;
        if ext.is_empty() {
            None
        } else {
            Some(ext.to_ascii_lowercase())
        }
    }

    /// 缓存根目录下的确定性本地路径
    pub fn to_local_path(&self, root: &Path) -> PathBuf {
        self.0
            .split('/')
            .fold(root.to_path_buf(), |acc, seg| acc.join(seg))
    }
}

impl fmt::Display for AssetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
