use std::time::Duration;

use crate::{models::ProviderConfig, router::ProviderKind};

/**
 * \brief 读取环境变量，未设置时返回默认值。
 */
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_secs(key: &str, default: u64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}

fn env_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

/**
 * \brief 根据环境变量构造 Provider 的默认配置；每次解析时重新读取。
 * \param provider 请求中的 Provider 标识（通用类型保留原标识）
 */
pub fn env_defaults(provider: &str) -> ProviderConfig {
    let (api_key, base_url, model) = match ProviderKind::from_id(provider) {
        ProviderKind::OpenAi => (
            env_or("OPENAI_API_KEY", ""),
            env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            "gpt-3.5-turbo",
        ),
        ProviderKind::Anthropic => (
            env_or("ANTHROPIC_API_KEY", ""),
            env_or("ANTHROPIC_BASE_URL", "https://api.anthropic.com"),
            "claude-3-sonnet-20240229",
        ),
        ProviderKind::Synthetic => (String::new(), "demo".to_string(), "demo-model"),
        ProviderKind::Compatible => (
            env_or("CUSTOM_API_KEY", ""),
            env_or("CUSTOM_BASE_URL", ""),
            "gpt-3.5-turbo",
        ),
    };
    ProviderConfig {
        provider: provider.to_string(),
        api_key,
        base_url,
        model: model.to_string(),
    }
}

/**
 * \brief 上游 HTTP 调用参数，按部署配置而非按请求配置。
 */
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /** \brief 建连超时 */
    pub connect_timeout: Duration,
    /** \brief 单次读取超时，流式慢速输出不会被提前中断 */
    pub read_timeout: Duration,
    /** \brief 非流式调用的总时限，含读取响应体 */
    pub request_timeout: Duration,
    /** \brief 空闲连接保留时间 */
    pub pool_idle_timeout: Duration,
    /** \brief 本地合成 Provider 的模拟延迟 */
    pub synthetic_latency: Duration,
    /** \brief 本地合成 Provider 流式输出的字符间隔上限 */
    pub synthetic_pause: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(120),
            request_timeout: Duration::from_secs(180),
            pool_idle_timeout: Duration::from_secs(90),
            synthetic_latency: Duration::from_millis(1000),
            synthetic_pause: Duration::from_millis(40),
        }
    }
}

impl HttpSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            connect_timeout: env_secs("CHATRELAY_CONNECT_TIMEOUT_SECS", 30),
            read_timeout: env_secs("CHATRELAY_READ_TIMEOUT_SECS", 120),
            request_timeout: env_secs("CHATRELAY_REQUEST_TIMEOUT_SECS", 180),
            synthetic_latency: env_millis(
                "CHATRELAY_SYNTHETIC_LATENCY_MS",
                defaults.synthetic_latency,
            ),
            synthetic_pause: env_millis(
                "CHATRELAY_SYNTHETIC_PAUSE_MS",
                defaults.synthetic_pause,
            ),
            ..defaults
        }
    }

    /**
     * \brief 关闭所有模拟延迟，供测试使用。
     */
    pub fn without_synthetic_delay(mut self) -> Self {
        self.synthetic_latency = Duration::ZERO;
        self.synthetic_pause = Duration::ZERO;
        self
    }

    /**
     * \brief 构建共享 HTTP 客户端；HTTP_PROXY/HTTPS_PROXY 由 reqwest 自动识别。
     */
    pub fn build_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .read_timeout(self.read_timeout)
            .pool_idle_timeout(self.pool_idle_timeout)
            .build()
    }
}

/**
 * \brief HTTP 服务监听与跨域配置。
 */
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

impl ServerSettings {
    pub fn from_env() -> Self {
        let port = env_or("BACKEND_PORT", "8000").parse().unwrap_or(8000);
        let allowed_origins = env_or(
            "ALLOWED_ORIGINS",
            "http://localhost:3000,http://localhost:5173",
        )
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
        Self {
            host: env_or("BACKEND_HOST", "127.0.0.1"),
            port,
            allowed_origins,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_defaults_need_no_env() {
        let cfg = env_defaults("demo");
        assert_eq!(cfg.provider, "demo");
        assert_eq!(cfg.base_url, "demo");
        assert_eq!(cfg.model, "demo-model");
        assert!(cfg.api_key.is_empty());
    }

    #[test]
    fn test_generic_keeps_identifier() {
        let cfg = env_defaults("siliconflow");
        assert_eq!(cfg.provider, "siliconflow");
        assert_eq!(cfg.model, "gpt-3.5-turbo");
    }

    #[test]
    fn test_without_synthetic_delay() {
        let s = HttpSettings::default().without_synthetic_delay();
        assert_eq!(s.synthetic_latency, Duration::ZERO);
        assert_eq!(s.synthetic_pause, Duration::ZERO);
        assert_eq!(s.connect_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_http_settings_from_env_reads_synthetic_delays() {
        std::env::set_var("CHATRELAY_SYNTHETIC_LATENCY_MS", "250");
        std::env::set_var("CHATRELAY_SYNTHETIC_PAUSE_MS", "not-a-number");
        std::env::set_var("CHATRELAY_REQUEST_TIMEOUT_SECS", "45");
        let s = HttpSettings::from_env();
        assert_eq!(s.synthetic_latency, Duration::from_millis(250));
        assert_eq!(s.synthetic_pause, Duration::from_millis(40));
        assert_eq!(s.request_timeout, Duration::from_secs(45));
    }
}
