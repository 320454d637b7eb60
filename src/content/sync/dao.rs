//! 本地内容存储（DAO）
//!
//! 两条独立记录存放在 `local_kv` 表中：
//! - `sync_metadata`：完整故事集合和校验和，体积大
//! - `content_version`：版本戳，只在 `sync_metadata` 可用时才可信

use crate::content::serialization::now_millis;
use crate::content::sync::models::{SyncMetadata, VersionStamp};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, warn};

pub const SYNC_METADATA_KEY: &str = "sync_metadata";
pub const CONTENT_VERSION_KEY: &str = "content_version";

/// 本地内容存储（基于 sqlx）
#[derive(Clone)]
pub struct SyncStore {
    db: Pool<Sqlite>,
}

impl SyncStore {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.db
    }

    async fn load_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let row = sqlx::query(
            r#"
            SELECT value FROM local_kv WHERE key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await
        .with_context(|| format!("查询本地记录失败: {}", key))?;

        let Some(row) = row else {
            debug!("[SyncStore] 本地记录不存在: {}", key);
            return Ok(None);
        };
        let raw: String = row.get("value");
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                // 坏记录当作不存在，下一次同步按首次同步处理
                warn!("[SyncStore] 本地记录 {} 无法解析，按不存在处理: {}", key, e);
                Ok(None)
            }
        }
    }

    /// 读取同步元数据
    pub async fn load_metadata(&self) -> Result<Option<SyncMetadata>> {
        let metadata: Option<SyncMetadata> = self.load_json(SYNC_METADATA_KEY).await?;
        if let Some(m) = &metadata {
            debug!(
                "[SyncStore] 读取同步元数据，版本: {}, 故事数: {}",
                m.version,
                m.items.len()
            );
        }
        Ok(metadata)
    }

    /// 读取版本戳
    pub async fn load_version_stamp(&self) -> Result<Option<VersionStamp>> {
        self.load_json(CONTENT_VERSION_KEY).await
    }

    /// 在同一个事务中写入元数据和版本戳
    pub async fn commit(&self, metadata: &SyncMetadata, stamp: &VersionStamp) -> Result<()> {
        let metadata_json = serde_json::to_string(metadata).context("序列化同步元数据失败")?;
        let stamp_json = serde_json::to_string(stamp).context("序列化版本戳失败")?;
        let now = now_millis();

        let sql = r#"
            INSERT INTO local_kv (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
        "#;

        let mut tx = self.db.begin().await.context("开启事务失败")?;
        sqlx::query(sql)
            .bind(SYNC_METADATA_KEY)
            .bind(&metadata_json)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("写入同步元数据失败")?;
        sqlx::query(sql)
            .bind(CONTENT_VERSION_KEY)
            .bind(&stamp_json)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("写入版本戳失败")?;
        tx.commit().await.context("提交事务失败")?;

        info!(
            "[SyncStore] 💾 已提交，内容版本: {}, 资源版本: {}, 故事数: {}",
            stamp.content_version,
            stamp.asset_version,
            metadata.items.len()
        );
        Ok(())
    }

    /// 清空两条记录
    pub async fn clear(&self) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM local_kv WHERE key IN (?, ?)
            "#,
        )
        .bind(SYNC_METADATA_KEY)
        .bind(CONTENT_VERSION_KEY)
        .execute(&self.db)
        .await
        .context("清空本地记录失败")?;
        info!("[SyncStore] 本地记录已清空");
        Ok(())
    }
}
