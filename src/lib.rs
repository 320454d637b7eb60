pub mod content;

// 重新导出常用类型和函数，方便外部使用
pub use content::{
    asset::{AssetPath, ImageResolver},
    client::ContentClient,
    config::{ContentClientConfig, GatewayEndpoints, SyncTuning},
    error::GatewayError,
    story::{Story, StoryPage},
    sync::{SyncListener, SyncPhase, SyncProgress, SyncStats, SyncStatus},
};
