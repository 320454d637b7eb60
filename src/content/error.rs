//! 内容网关错误类型
//!
//! 网络层的失败需要区分“服务器不可达”和“服务器返回了错误”，
//! 前者意味着继续使用本地缓存，后者意味着本轮同步失败。

/// 内容网关请求失败
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// 请求超时
    #[error("请求超时: {0}")]
    Timeout(String),
    /// 连接失败（DNS、拒绝连接、TLS 等）
    #[error("服务器不可达: {0}")]
    Unreachable(String),
    /// 服务器返回非 2xx 状态码
    #[error("HTTP 错误 {status}: {body}")]
    Status { status: u16, body: String },
    /// 响应体无法反序列化
    #[error("反序列化响应失败: {0}")]
    Decode(String),
    /// 请求本身不合法（未发出）
    #[error("无效请求: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    /// 是否属于“服务器不可达”一类（超时或连接失败）
    pub fn is_unreachable(&self) -> bool {
        matches!(self, GatewayError::Timeout(_) | GatewayError::Unreachable(_))
    }

    /// 将 reqwest 的发送错误归类
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout(err.to_string())
        } else if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            GatewayError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            GatewayError::Unreachable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_unreachable() {
        assert!(GatewayError::Timeout("5s".into()).is_unreachable());
        assert!(GatewayError::Unreachable("refused".into()).is_unreachable());
        assert!(!GatewayError::Status {
            status: 500,
            body: String::new()
        }
        .is_unreachable());
        assert!(!GatewayError::Decode("eof".into()).is_unreachable());
    }
}
