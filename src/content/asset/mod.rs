//! 资源模块：路径规范化、完整性校验、磁盘缓存、签名、下载与解析

pub mod cache;
pub mod downloader;
pub mod fetcher;
pub mod memory;
pub mod path;
pub mod resolver;
pub mod signer;
pub mod validator;

pub use cache::DiskAssetCache;
pub use downloader::{AssetDownloader, DownloadEntry, DownloadError, DownloadProgress, DownloadStats};
pub use fetcher::{AssetFetcher, HttpAssetFetcher};
pub use memory::MemoryIndex;
pub use path::{AssetPath, InvalidAssetPath};
pub use resolver::ImageResolver;
pub use signer::{BatchUrlSigner, SignedUrl, SignedUrlBatch};
pub use validator::{IntegrityValidator, ValidationResult};
