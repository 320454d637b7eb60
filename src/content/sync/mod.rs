//! 内容同步模块
//!
//! - `api`：内容网关请求
//! - `types`：网关 DTO
//! - `models`：同步元数据、版本戳、统计
//! - `dao`：本地内容存储
//! - `version`：版本检查
//! - `delta`：增量合并
//! - `listener`：进度回调
//! - `service`：同步编排

pub mod api;
pub mod dao;
pub mod delta;
pub mod listener;
pub mod models;
pub mod service;
pub mod types;
pub mod version;

pub use api::{build_gateway_client, ContentApi, HttpContentApi};
pub use dao::SyncStore;
pub use delta::{merge_delta, DeltaSyncEngine, MergeOutcome};
pub use listener::{EmptySyncListener, SyncListener};
pub use models::{
    SyncMetadata, SyncPhase, SyncProgress, SyncStats, SyncStatus, VersionCheck, VersionStamp,
};
pub use service::{ContentSyncer, SyncerParts};
pub use version::VersionManager;
