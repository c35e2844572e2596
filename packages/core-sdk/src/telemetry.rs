use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

/** \brief 未设置 RUST_LOG 时的默认过滤级别。 */
pub const DEFAULT_FILTER: &str = "info";

/**
 * \brief 构造日志过滤器：优先 RUST_LOG，其次调用方给定的指令。
 */
pub fn env_filter(fallback: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(fallback.unwrap_or(DEFAULT_FILTER)))
}

/**
 * \brief 安装全局 tracing 订阅者。
 * \param json   是否输出 JSON 结构化日志
 * \param filter 未设置 RUST_LOG 时使用的过滤指令
 */
pub fn init(json: bool, filter: Option<&str>) -> Result<()> {
    let builder = fmt()
        .with_env_filter(env_filter(filter))
        .with_target(false);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow!("install tracing subscriber failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_reports_error() {
        let _ = init(false, Some("debug"));
        assert!(init(true, None).is_err());
    }
}
