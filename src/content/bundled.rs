//! 内置种子故事
//!
//! 编译期嵌入的只读数据，只在从未同步过时作为兜底展示，永远不是同步目标。

use crate::content::story::Story;
use anyhow::{Context, Result};

const BUNDLED_STORIES_JSON: &str = include_str!("../../bundled/stories.json");

/// 解析内置故事
pub fn bundled_stories() -> Result<Vec<Story>> {
    serde_json::from_str(BUNDLED_STORIES_JSON).context("解析内置故事失败")
}
