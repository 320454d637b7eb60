//! 内容网关 API DTO（请求和响应结构体）
//!
//! 响应同时接受网关的旧字段名（`version`、`storyChecksums`、`stories` 等）。

use crate::content::serialization::{deserialize_map_or_null, deserialize_vec_or_null};
use crate::content::story::Story;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 版本检查响应
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentVersionResp {
    #[serde(alias = "version")]
    pub content_version: u64,
    #[serde(default)]
    pub asset_version: u64,
    #[serde(default)]
    pub last_updated: i64,
    #[serde(
        default,
        alias = "storyChecksums",
        deserialize_with = "deserialize_map_or_null"
    )]
    pub checksums: HashMap<String, String>,
    #[serde(default, alias = "totalStories")]
    pub total_count: u64,
}

/// 增量同步请求：一次性携带本地全部校验和
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeltaSyncReq {
    pub client_version: u64,
    pub checksums: HashMap<String, String>,
}

/// 增量同步响应
///
/// `checksums` 必须覆盖服务器上的全部故事，客户端靠它做删除检测
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeltaSyncResp {
    pub server_version: u64,
    #[serde(default, alias = "stories", deserialize_with = "deserialize_vec_or_null")]
    pub items: Vec<Story>,
    #[serde(
        default,
        alias = "deletedStoryIds",
        deserialize_with = "deserialize_vec_or_null"
    )]
    pub deleted_ids: Vec<String>,
    #[serde(
        default,
        alias = "storyChecksums",
        deserialize_with = "deserialize_map_or_null"
    )]
    pub checksums: HashMap<String, String>,
    #[serde(default, alias = "totalStories")]
    pub total_count: u64,
    #[serde(default)]
    pub updated_count: u64,
    #[serde(default)]
    pub last_updated: i64,
}

/// 批量签名 URL 请求
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchUrlsReq {
    pub paths: Vec<String>,
}

/// 单条签名 URL
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrlEntry {
    pub path: String,
    pub signed_url: String,
    #[serde(default)]
    pub expires_at: i64,
}

/// 批量签名 URL 响应
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchUrlsResp {
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub urls: Vec<SignedUrlEntry>,
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub failed: Vec<String>,
}

/// 资源版本清单
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetVersionResp {
    pub version: u64,
    #[serde(default, deserialize_with = "deserialize_map_or_null")]
    pub asset_checksums: HashMap<String, String>,
    #[serde(default)]
    pub total_assets: u64,
}
