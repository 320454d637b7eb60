//! 序列化辅助函数
//!
//! 网关返回的数组和对象字段可能为 null，统一按空值处理。

use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

/// 反序列化数组字段，处理 null 值
pub(crate) fn deserialize_vec_or_null<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt = Option::<Vec<T>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// 反序列化 map 字段，处理 null 值
pub(crate) fn deserialize_map_or_null<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<HashMap<String, String>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// 当前时间（毫秒时间戳）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
