//! 故事本地模型定义
//!
//! 只对同步和缓存关心的字段建模（id、校验和、资源引用），
//! 其余字段原样保存在 `extra` 中，持久化时不丢失。

use crate::content::serialization::deserialize_vec_or_null;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 故事（同步的基本单位）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    /// 故事 ID
    pub id: String,
    /// 服务器计算的内容校验和（不透明字符串）
    #[serde(default)]
    pub checksum: String,
    /// 封面图
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    /// 有序页面
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub pages: Vec<StoryPage>,
    /// 其余字段（标题、分类、年龄段等）
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 故事页面
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryPage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub page_number: i32,
    /// 页面类型：cover / story / ending
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub page_type: Option<String>,
    /// 背景图
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
    /// 角色图
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_image: Option<String>,
    /// 旁白音频
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    /// 可交互元素
    #[serde(
        default,
        deserialize_with = "deserialize_vec_or_null",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub interactive_elements: Vec<InteractiveElement>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 页面上的可交互元素
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveElement {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

fn push_ref<'a>(refs: &mut Vec<&'a str>, value: &'a Option<String>) {
    if let Some(v) = value.as_deref() {
        let v = v.trim();
        if !v.is_empty() && !refs.contains(&v) {
            refs.push(v);
        }
    }
}

fn map_ref(value: &Option<String>, f: &dyn Fn(&str) -> Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(|v| f(v.trim()).unwrap_or_else(|| v.to_string()))
}

impl Story {
    /// 故事引用的全部资源（原始写法，按出现顺序去重）
    pub fn asset_refs(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        push_ref(&mut refs, &self.cover_image);
        for page in &self.pages {
            push_ref(&mut refs, &page.background_image);
            push_ref(&mut refs, &page.character_image);
            push_ref(&mut refs, &page.audio_url);
            for element in &page.interactive_elements {
                push_ref(&mut refs, &element.image);
            }
        }
        refs
    }

    /// 返回一个新的故事值，资源引用经 `f` 改写（`f` 返回 None 则保持原值）
    ///
    /// 原故事不变，改写后的值只用于展示，不能写回本地存储
    pub fn map_asset_refs(&self, f: &dyn Fn(&str) -> Option<String>) -> Story {
        let mut out = self.clone();
        out.cover_image = map_ref(&self.cover_image, f);
        for page in out.pages.iter_mut() {
            page.background_image = map_ref(&page.background_image, f);
            page.character_image = map_ref(&page.character_image, f);
            page.audio_url = map_ref(&page.audio_url, f);
            for element in page.interactive_elements.iter_mut() {
                element.image = map_ref(&element.image, f);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::testing::story;

    #[test]
    fn collects_refs_in_order_without_duplicates() {
        let s = story("fox", "c1");
        assert_eq!(
            s.asset_refs(),
            vec![
                "assets/stories/fox/cover.webp",
                "assets/stories/fox/page1-bg.webp",
                "stories/fox/fox.png",
                "audio/fox/page1.mp3",
                "stories/fox/star.png",
            ]
        );
    }

    #[test]
    fn mapping_returns_a_new_value() {
        let s = story("fox", "c1");
        let mapped = s.map_asset_refs(&|r| {
            r.ends_with(".png")
                .then(|| format!("file:///cache/{}", r))
        });
        assert_eq!(
            mapped.pages[0].character_image.as_deref(),
            Some("file:///cache/stories/fox/fox.png")
        );
        assert_eq!(
            mapped.cover_image.as_deref(),
            Some("assets/stories/fox/cover.webp")
        );
        // 原值不受影响
        assert_eq!(s.pages[0].character_image.as_deref(), Some("stories/fox/fox.png"));
        assert_ne!(s, mapped);
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let raw = r#"{
            "id": "fox",
            "checksum": "c1",
            "title": {"en": "The Fox", "pl": "Lis"},
            "ageRange": "2-5",
            "pages": [{"id": "p1", "pageNumber": 1, "type": "story", "text": "Hello",
                       "interactiveElements": [{"id": "e1", "type": "tap", "image": "stories/fox/e1.png",
                                                "position": {"x": 0.5, "y": 0.25},
                                                "hitArea": {"x": 0, "y": 0, "width": 1, "height": 1}}]}]
        }"#;
        let s: Story = serde_json::from_str(raw).unwrap();
        assert_eq!(s.extra.get("ageRange"), Some(&Value::from("2-5")));
        assert_eq!(s.pages[0].extra.get("text"), Some(&Value::from("Hello")));
        let element = &s.pages[0].interactive_elements[0];
        assert_eq!(element.position, Some(Position { x: 0.5, y: 0.25 }));
        assert!(element.extra.contains_key("hitArea"));

        let back: Story = serde_json::from_str(&serde_json::to_string(&s).unwrap()).unwrap();
        assert_eq!(back, s);
    }
}
