use thiserror::Error;

/**
 * \brief 网关核心错误分类；调用方据此选择对客户端的状态码。
 */
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no API key configured for provider '{provider}'")]
    MissingCredential { provider: String },

    #[error("malformed API key for provider '{provider}': expected prefix '{expected_prefix}'")]
    MalformedCredential {
        provider: String,
        expected_prefix: &'static str,
    },

    #[error("no base URL configured for provider '{provider}'")]
    MissingEndpoint { provider: String },

    #[error("upstream returned HTTP {status}: {message}")]
    UpstreamHttp { status: u16, message: String },

    #[error("upstream protocol violation: {reason}")]
    UpstreamProtocolViolation { reason: String },

    #[error("upstream request timed out: {0}")]
    UpstreamTimeout(String),

    #[error("failed to connect to upstream: {0}")]
    UpstreamConnectFailure(String),

    #[error("upstream transport error: {0}")]
    UpstreamTransport(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    pub fn protocol(reason: impl Into<String>) -> Self {
        GatewayError::UpstreamProtocolViolation {
            reason: reason.into(),
        }
    }

    /**
     * \brief 映射为面向客户端的 HTTP 状态码。
     */
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::InvalidRequest(_)
            | GatewayError::MissingCredential { .. }
            | GatewayError::MalformedCredential { .. }
            | GatewayError::MissingEndpoint { .. } => 400,
            GatewayError::UpstreamHttp { status, .. } if (400..600).contains(status) => *status,
            GatewayError::UpstreamHttp { .. } | GatewayError::UpstreamProtocolViolation { .. } => {
                502
            }
            GatewayError::UpstreamTimeout(_) => 504,
            GatewayError::UpstreamConnectFailure(_) => 503,
            GatewayError::UpstreamTransport(_) | GatewayError::Internal(_) => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            GatewayError::InvalidRequest(_)
                | GatewayError::MissingCredential { .. }
                | GatewayError::MalformedCredential { .. }
                | GatewayError::MissingEndpoint { .. }
        )
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::UpstreamTimeout(err.to_string())
        } else if err.is_connect() {
            GatewayError::UpstreamConnectFailure(err.to_string())
        } else if err.is_decode() {
            GatewayError::protocol(format!("undecodable body: {}", err))
        } else {
            GatewayError::UpstreamTransport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::protocol(format!("invalid JSON body: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::MissingCredential {
                provider: "openai".into()
            }
            .status_code(),
            400
        );
        assert_eq!(
            GatewayError::UpstreamHttp {
                status: 401,
                message: "bad key".into()
            }
            .status_code(),
            401
        );
        assert_eq!(
            GatewayError::UpstreamHttp {
                status: 302,
                message: "redirect".into()
            }
            .status_code(),
            502
        );
        assert_eq!(GatewayError::protocol("empty").status_code(), 502);
        assert_eq!(GatewayError::UpstreamTimeout("t".into()).status_code(), 504);
        assert_eq!(
            GatewayError::UpstreamConnectFailure("c".into()).status_code(),
            503
        );
        assert_eq!(GatewayError::Internal("boom".into()).status_code(), 500);
    }

    #[test]
    fn test_malformed_message_names_prefix() {
        let err = GatewayError::MalformedCredential {
            provider: "anthropic".into(),
            expected_prefix: "sk-ant-",
        };
        let text = err.to_string();
        assert!(text.contains("anthropic"));
        assert!(text.contains("sk-ant-"));
        assert!(err.is_client_error());
    }
}
