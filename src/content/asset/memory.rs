//! 内存解析索引：资源 key -> 本地文件路径
//!
//! 同步读写，锁只在查找/插入期间持有，从不跨越 await。

use crate::content::asset::path::AssetPath;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryIndex {
    entries: Mutex<HashMap<AssetPath, PathBuf>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &AssetPath) -> Option<PathBuf> {
        self.entries
            .lock()
            .ok()
            .and_then(|map| map.get(key).cloned())
    }

    pub fn insert(&self, key: AssetPath, local: PathBuf) {
        if let Ok(mut map) = self.entries.lock() {
            map.insert(key, local);
        }
    }

    pub fn remove(&self, key: &AssetPath) -> Option<PathBuf> {
        self.entries.lock().ok().and_then(|mut map| map.remove(key))
    }

    pub fn clear(&self) {
        if let Ok(mut map) = self.entries.lock() {
            map.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let index = MemoryIndex::new();
        let key = AssetPath::parse("stories/a/cover.webp", "assets/").unwrap();
        assert!(index.is_empty());
        index.insert(key.clone(), PathBuf::from("/cache/stories/a/cover.webp"));
        assert_eq!(
            index.get(&key),
            Some(PathBuf::from("/cache/stories/a/cover.webp"))
        );
        assert_eq!(index.len(), 1);
        assert!(index.remove(&key).is_some());
        assert_eq!(index.get(&key), None);
        assert!(index.remove(&key).is_none());
    }
}
