pub mod asset;
pub mod bundled;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod serialization;
pub mod story;
pub mod sync;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// 重新导出客户端和配置
pub use client::ContentClient;
pub use config::{ContentClientConfig, GatewayEndpoints, SyncTuning};
pub use error::GatewayError;
