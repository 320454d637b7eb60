//! 增量同步：请求变化的故事并合并到本地集合
//!
//! 删除检测依赖服务器返回的完整校验和表：本地有、服务器表里没有的 id 即为已删除。
//! 校验和表不完整时无法区分“未变化”和“已删除”，因此直接拒绝该响应。

use crate::content::story::Story;
use crate::content::sync::api::ContentApi;
use crate::content::sync::models::SyncMetadata;
use crate::content::sync::types::{DeltaSyncReq, DeltaSyncResp};
use anyhow::{bail, Context, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 合并结果
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// 合并后的元数据（时间戳和资源清单沿用本地值，由调用方更新）
    pub metadata: SyncMetadata,
    /// 被更新故事的旧版本（用于让旧资源失效）
    pub replaced: Vec<Story>,
    /// 新增的故事 id
    pub added: Vec<String>,
    /// 被删除的故事
    pub removed: Vec<Story>,
    /// 服务器校验和表中有、但本地没有也没收到的故事 id
    pub missing: Vec<String>,
}

impl MergeOutcome {
    /// 本轮新增或内容变化的故事 id
    pub fn updated_ids(&self) -> HashSet<&str> {
        self.replaced
            .iter()
            .map(|s| s.id.as_str())
            .chain(self.added.iter().map(String::as_str))
            .collect()
    }
}

/// 增量同步引擎
pub struct DeltaSyncEngine {
    api: Arc<dyn ContentApi>,
}

impl DeltaSyncEngine {
    pub fn new(api: Arc<dyn ContentApi>) -> Self {
        Self { api }
    }

    /// 一次请求携带本地版本和全部校验和
    pub async fn fetch_delta(
        &self,
        local_version: u64,
        local_checksums: &HashMap<String, String>,
    ) -> Result<DeltaSyncResp> {
        let req = DeltaSyncReq {
            client_version: local_version,
            checksums: local_checksums.clone(),
        };
        debug!(
            "[DeltaSync] 请求体: {}",
            serde_json::to_string(&req).unwrap_or_default()
        );
        let resp = self
            .api
            .fetch_delta(&req)
            .await
            .context("增量同步请求失败")?;
        Ok(resp)
    }
}

/// 把增量响应合并进本地元数据
///
/// `kept = 本地中未更新且仍在服务器校验和表中的故事`，结果为 `kept ++ resp.items`
pub fn merge_delta(local: &SyncMetadata, resp: &DeltaSyncResp) -> Result<MergeOutcome> {
    if resp.checksums.len() as u64 != resp.total_count {
        bail!(
            "服务器校验和表不完整: {} 项，总数 {}",
            resp.checksums.len(),
            resp.total_count
        );
    }
    // 网关返回的故事本身不带校验和，以校验和表为准
    let mut incoming_ids = HashSet::new();
    let mut incoming: Vec<Story> = Vec::with_capacity(resp.items.len());
    for item in &resp.items {
        if !incoming_ids.insert(item.id.as_str()) {
            bail!("增量响应中故事重复: {}", item.id);
        }
        let Some(sum) = resp.checksums.get(&item.id) else {
            bail!("故事 {} 不在服务器校验和表中", item.id);
        };
        if !item.checksum.is_empty() && item.checksum != *sum {
            bail!(
                "故事 {} 的校验和与服务器校验和表不一致: {} != {}",
                item.id,
                item.checksum,
                sum
            );
        }
        let mut item = item.clone();
        item.checksum = sum.clone();
        incoming.push(item);
    }
    let explicitly_deleted: HashSet<&str> = resp.deleted_ids.iter().map(String::as_str).collect();

    let mut kept = Vec::with_capacity(local.items.len());
    let mut replaced = Vec::new();
    let mut removed = Vec::new();
    for item in &local.items {
        if incoming_ids.contains(item.id.as_str()) {
            replaced.push(item.clone());
        } else if !resp.checksums.contains_key(&item.id)
            || explicitly_deleted.contains(item.id.as_str())
        {
            removed.push(item.clone());
        } else {
            kept.push(item.clone());
        }
    }

    let local_ids: HashSet<&str> = local.items.iter().map(|s| s.id.as_str()).collect();
    let added: Vec<String> = incoming
        .iter()
        .filter(|s| !local_ids.contains(s.id.as_str()))
        .map(|s| s.id.clone())
        .collect();

    let received = incoming.len();
    let mut items = kept;
    items.extend(incoming);
    let checksums: HashMap<String, String> = items
        .iter()
        .map(|s| (s.id.clone(), s.checksum.clone()))
        .collect();

    // 服务器表里有、本地却既没保留也没收到的故事：版本号不推进，下一轮会带着本地校验和重新请求
    let mut missing: Vec<String> = resp
        .checksums
        .keys()
        .filter(|id| !checksums.contains_key(*id) && !explicitly_deleted.contains(id.as_str()))
        .cloned()
        .collect();
    missing.sort();
    let version = if missing.is_empty() {
        resp.server_version
    } else {
        warn!(
            "[DeltaSync] ⚠️ 服务器有但本地缺失的故事: {:?}，保留本地版本 {}",
            missing, local.version
        );
        local.version
    };

    info!(
        "[DeltaSync] 合并完成：保留 {}, 更新 {}, 新增 {}, 删除 {}",
        items.len() - received,
        replaced.len(),
        added.len(),
        removed.len()
    );

    Ok(MergeOutcome {
        metadata: SyncMetadata {
            version,
            last_sync_timestamp: local.last_sync_timestamp,
            checksums,
            items,
            asset_checksums: local.asset_checksums.clone(),
        },
        replaced,
        added,
        removed,
        missing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::testing::{delta_resp, story, FakeContentApi};

    fn local(items: Vec<Story>) -> SyncMetadata {
        SyncMetadata {
            version: 3,
            last_sync_timestamp: 1,
            checksums: items
                .iter()
                .map(|s| (s.id.clone(), s.checksum.clone()))
                .collect(),
            items,
            asset_checksums: HashMap::new(),
        }
    }

    fn ids(metadata: &SyncMetadata) -> Vec<&str> {
        metadata.items.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn deletion_is_detected_by_checksum_map() {
        let base = local(vec![story("A", "a1"), story("B", "b1"), story("C", "c1")]);
        let resp = delta_resp(4, vec![], &[("A", "a1"), ("C", "c1")], &[]);

        let out = merge_delta(&base, &resp).unwrap();
        assert_eq!(ids(&out.metadata), vec!["A", "C"]);
        assert_eq!(out.removed.len(), 1);
        assert_eq!(out.removed[0].id, "B");
        assert!(out.metadata.is_consistent());
        assert_eq!(out.metadata.version, 4);
    }

    #[test]
    fn updated_items_replace_old_versions() {
        let base = local(vec![story("A", "a1"), story("B", "b1")]);
        let resp = delta_resp(
            5,
            vec![story("B", "b2"), story("D", "d1")],
            &[("A", "a1"), ("B", "b2"), ("D", "d1")],
            &[],
        );

        let out = merge_delta(&base, &resp).unwrap();
        assert_eq!(ids(&out.metadata), vec!["A", "B", "D"]);
        assert_eq!(out.metadata.checksums.get("B").map(String::as_str), Some("b2"));
        assert_eq!(out.replaced.len(), 1);
        assert_eq!(out.replaced[0].checksum, "b1");
        assert_eq!(out.added, vec!["D".to_string()]);
        assert_eq!(out.updated_ids(), HashSet::from(["B", "D"]));
        assert!(out.metadata.is_consistent());
    }

    #[test]
    fn explicit_deleted_ids_are_honoured() {
        let base = local(vec![story("A", "a1"), story("B", "b1")]);
        let mut resp = delta_resp(4, vec![], &[("A", "a1"), ("B", "b1")], &["B"]);
        resp.checksums.remove("B");
        resp.total_count = 1;
        let out = merge_delta(&base, &resp).unwrap();
        assert_eq!(ids(&out.metadata), vec!["A"]);
    }

    #[test]
    fn gateway_stories_take_checksums_from_the_map() {
        let body = r#"{
            "serverVersion": 2,
            "stories": [{"id": "a", "title": "A", "pages": []}],
            "storyChecksums": {"a": "x1"},
            "totalStories": 1
        }"#;
        let resp: DeltaSyncResp = serde_json::from_str(body).unwrap();
        assert_eq!(resp.items[0].checksum, "");

        let out = merge_delta(&SyncMetadata::default(), &resp).unwrap();
        assert_eq!(ids(&out.metadata), vec!["a"]);
        assert_eq!(out.metadata.items[0].checksum, "x1");
        assert_eq!(out.metadata.checksums.get("a").map(String::as_str), Some("x1"));
        assert!(out.metadata.is_consistent());
        assert_eq!(out.metadata.version, 2);

        // 故事自带的校验和与表冲突时拒绝
        let mut conflicting = resp.clone();
        conflicting.items[0].checksum = "x0".to_string();
        assert!(merge_delta(&SyncMetadata::default(), &conflicting).is_err());
    }

    #[test]
    fn unresolved_server_ids_keep_the_local_version() {
        let base = local(vec![story("A", "a1")]);
        let resp = delta_resp(4, vec![], &[("A", "a1"), ("E", "e1")], &[]);

        let out = merge_delta(&base, &resp).unwrap();
        assert_eq!(ids(&out.metadata), vec!["A"]);
        assert_eq!(out.missing, vec!["E".to_string()]);
        assert_eq!(out.metadata.version, 3);
        assert!(out.metadata.is_consistent());
    }

    #[test]
    fn partial_checksum_map_is_rejected() {
        let base = local(vec![story("A", "a1"), story("B", "b1")]);
        let mut resp = delta_resp(4, vec![], &[("A", "a1")], &[]);
        resp.total_count = 2;
        assert!(merge_delta(&base, &resp).is_err());

        // 返回的故事不在校验和表中
        let resp = delta_resp(4, vec![story("C", "c1")], &[("A", "a1")], &[]);
        assert!(merge_delta(&base, &resp).is_err());
    }

    #[tokio::test]
    async fn one_request_carries_all_checksums() {
        let api = Arc::new(FakeContentApi::new());
        api.set_delta(delta_resp(4, vec![], &[("A", "a1")], &[]));
        let engine = DeltaSyncEngine::new(api.clone());
        let base = local(vec![story("A", "a1"), story("B", "b1")]);

        engine.fetch_delta(3, &base.checksums).await.unwrap();

        let requests = api.delta_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].client_version, 3);
        assert_eq!(requests[0].checksums, base.checksums);
    }
}
