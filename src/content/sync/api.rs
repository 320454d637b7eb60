//! 内容网关 HTTP API 客户端
//!
//! 负责版本检查、增量同步、批量签名 URL、资源版本清单四个请求。
//! 认证头由外部构建的 `reqwest::Client` 统一附加。

use crate::content::config::GatewayEndpoints;
use crate::content::error::GatewayError;
use crate::content::sync::types::{
    AssetVersionResp, BatchUrlsReq, BatchUrlsResp, ContentVersionResp, DeltaSyncReq,
    DeltaSyncResp,
};
use crate::content::types::handle_http_response;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// 请求 ID 头
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// 内容网关能力（已认证的 GET/POST，返回 JSON 或类型化失败）
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// 获取服务器版本戳
    async fn get_version(&self) -> Result<ContentVersionResp, GatewayError>;

    /// 增量同步：提交本地版本和全部校验和，只取回变化的故事
    async fn fetch_delta(&self, req: &DeltaSyncReq) -> Result<DeltaSyncResp, GatewayError>;

    /// 批量获取签名 URL（调用方保证不超过单批上限）
    async fn batch_urls(&self, paths: &[String]) -> Result<BatchUrlsResp, GatewayError>;

    /// 获取资源版本清单（每个资源的校验和）
    async fn get_asset_version(&self) -> Result<AssetVersionResp, GatewayError>;
}

/// 创建带认证头的 HTTP 客户端（token 通过 default_headers 自动添加）
pub fn build_gateway_client(token: &str, device_id: Option<&str>) -> Result<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::AUTHORIZATION,
        reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
            .context("无效的 token")?,
    );
    if let Some(device_id) = device_id {
        headers.insert(
            reqwest::header::HeaderName::from_static("x-device-id"),
            reqwest::header::HeaderValue::from_str(device_id).context("无效的设备 ID")?,
        );
    }
    reqwest::ClientBuilder::new()
        .default_headers(headers)
        .build()
        .context("创建 HTTP 客户端失败")
}

/// 基于 reqwest 的内容网关客户端
pub struct HttpContentApi {
    client: reqwest::Client,
    api_base_url: String,
    endpoints: GatewayEndpoints,
    request_timeout: Duration,
}

impl HttpContentApi {
    /// 创建新的内容网关客户端
    ///
    /// `client` 应该已经在外部配置好认证头
    pub fn new(
        client: reqwest::Client,
        api_base_url: String,
        endpoints: GatewayEndpoints,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            endpoints,
            request_timeout,
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.api_base_url, endpoint)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        operation_name: &str,
    ) -> Result<T, GatewayError> {
        let request_id = Uuid::new_v4().to_string();
        let url = self.url(endpoint);
        debug!("[ContentAPI]   请求URL: {}, 请求ID: {}", url, request_id);

        let response = self
            .client
            .get(&url)
            .header(REQUEST_ID_HEADER, &request_id)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;
        handle_http_response(response, operation_name).await
    }

    async fn post_json<B: serde::Serialize + ?Sized, T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
        operation_name: &str,
    ) -> Result<T, GatewayError> {
        let request_id = Uuid::new_v4().to_string();
        let url = self.url(endpoint);
        debug!("[ContentAPI]   请求URL: {}, 请求ID: {}", url, request_id);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header(REQUEST_ID_HEADER, &request_id)
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;
        handle_http_response(response, operation_name).await
    }
}

#[async_trait]
impl ContentApi for HttpContentApi {
    async fn get_version(&self) -> Result<ContentVersionResp, GatewayError> {
        info!("[ContentAPI] 📡 请求内容版本");
        let resp: ContentVersionResp = self.get_json(&self.endpoints.version, "内容版本").await?;
        info!(
            "[ContentAPI] ✅ 内容版本: {}, 资源版本: {}, 故事数: {}",
            resp.content_version, resp.asset_version, resp.total_count
        );
        Ok(resp)
    }

    async fn fetch_delta(&self, req: &DeltaSyncReq) -> Result<DeltaSyncResp, GatewayError> {
        info!(
            "[ContentAPI] 📡 请求增量同步，客户端版本: {}, 本地校验和数: {}",
            req.client_version,
            req.checksums.len()
        );
        let resp: DeltaSyncResp = self
            .post_json(&self.endpoints.delta, req, "增量同步")
            .await?;
        info!(
            "[ContentAPI] ✅ 增量同步响应，服务器版本: {}, 变化: {}, 删除: {}, 总数: {}",
            resp.server_version,
            resp.items.len(),
            resp.deleted_ids.len(),
            resp.total_count
        );
        Ok(resp)
    }

    async fn batch_urls(&self, paths: &[String]) -> Result<BatchUrlsResp, GatewayError> {
        if paths.is_empty() {
            return Err(GatewayError::InvalidRequest("paths 不能为空".to_string()));
        }
        debug!("[ContentAPI] 📡 请求批量签名 URL，路径数: {}", paths.len());
        let body = BatchUrlsReq {
            paths: paths.to_vec(),
        };
        self.post_json(&self.endpoints.batch_urls, &body, "批量签名URL")
            .await
    }

    async fn get_asset_version(&self) -> Result<AssetVersionResp, GatewayError> {
        info!("[ContentAPI] 📡 请求资源版本清单");
        self.get_json(&self.endpoints.asset_version, "资源版本").await
    }
}
