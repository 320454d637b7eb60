//! 故事（内容项）模块

pub mod models;

pub use models::{InteractiveElement, Position, Size, Story, StoryPage};

use crate::content::asset::path::{is_remote_url, AssetPath};
use std::collections::HashSet;
use tracing::warn;

/// 提取一组故事引用的资源路径（规范化后去重）
///
/// 直接写成远程 URL 的引用不参与同步，由解析层按需下载
pub fn collect_asset_paths<'a>(
    stories: impl IntoIterator<Item = &'a Story>,
    prefix: &str,
) -> Vec<AssetPath> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for story in stories {
        for raw in story.asset_refs() {
            if is_remote_url(raw) {
                continue;
            }
            match AssetPath::parse(raw, prefix) {
                Ok(path) => {
                    if seen.insert(path.clone()) {
                        out.push(path);
                    }
                }
                Err(e) => warn!("[Story] 故事 {} 含非法资源路径 {:?}: {}", story.id, raw, e),
            }
        }
    }
    out
}
