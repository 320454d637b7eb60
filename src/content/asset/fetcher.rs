//! 资源字节下载能力
//!
//! 签名 URL 已经自带授权，下载时不需要附加认证头。

use crate::content::error::GatewayError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// 根据 URL 下载资源字节
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, GatewayError>;
}

/// 基于 reqwest 的下载实现
pub struct HttpAssetFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpAssetFetcher {
    /// `client` 不应携带认证头
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, GatewayError> {
        debug!("[Fetcher] GET {}", url);
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(GatewayError::from_reqwest)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_bytes_and_maps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bucket/stories/a/cover.webp"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bucket/stories/a/expired.webp"))
            .respond_with(ResponseTemplate::new(403).set_body_string("expired"))
            .mount(&server)
            .await;

        let fetcher = HttpAssetFetcher::new(reqwest::Client::new(), Duration::from_secs(5));
        let ok = fetcher
            .fetch(&format!("{}/bucket/stories/a/cover.webp?sig=1", server.uri()))
            .await
            .unwrap();
        assert_eq!(ok, vec![1, 2, 3]);

        let err = fetcher
            .fetch(&format!("{}/bucket/stories/a/expired.webp", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::Status {
                status: 403,
                body: "expired".to_string()
            }
        );
    }

    #[tokio::test]
    async fn unreachable_host_is_classified() {
        let fetcher = HttpAssetFetcher::new(reqwest::Client::new(), Duration::from_secs(2));
        let err = fetcher
            .fetch("http://127.0.0.1:9/stories/a.png")
            .await
            .unwrap_err();
        assert!(err.is_unreachable(), "unexpected error: {:?}", err);
    }
}
