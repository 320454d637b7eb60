use crate::content::error::GatewayError;
use tracing::{debug, error};

/// 通用 HTTP 响应处理函数：检查状态码并把 body 反序列化为 `T`
///
/// 内容网关直接返回业务 JSON（没有外层包装），所有网关接口共用此方法
pub async fn handle_http_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> Result<T, GatewayError> {
    let status = response.status();

    // 读取 body bytes（只能读取一次）
    let body_bytes = response
        .bytes()
        .await
        .map_err(GatewayError::from_reqwest)?;
    let body_str = String::from_utf8_lossy(&body_bytes);
    debug!("[HTTP] {}响应 Body: {}", operation_name, body_str);

    if !status.is_success() {
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, body_str
        );
        return Err(GatewayError::Status {
            status: status.as_u16(),
            body: body_str.into_owned(),
        });
    }
    debug!("[HTTP] {}请求成功，HTTP状态: {}", operation_name, status);

    serde_json::from_slice(&body_bytes).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name, e, body_str
        );
        GatewayError::Decode(e.to_string())
    })
}
