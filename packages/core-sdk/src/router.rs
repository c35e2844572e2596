use std::{sync::Arc, time::Duration};

use crate::{
    catalog,
    config::{env_defaults, HttpSettings},
    error::{GatewayError, Result},
    llm::{self, AnthropicAdapter, CompatibleAdapter, OpenAiAdapter, SyntheticAdapter, WireAdapter},
    models::{ChatRequest, ChatResponse, ConnectionReport, Message, ModelCatalog, ProviderConfig},
    store::{ConfigStore, MemoryStore},
    stream::{normalize, EventStream},
};

static OPENAI: OpenAiAdapter = OpenAiAdapter;
static ANTHROPIC: AnthropicAdapter = AnthropicAdapter;
static COMPATIBLE: CompatibleAdapter = CompatibleAdapter;

const CONNECTION_TEST_PROMPT: &str = "Hello, this is a connection test.";

/**
 * \brief Provider 变体；标识只在入口处解析一次。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Compatible,
    Synthetic,
}

impl ProviderKind {
    /**
     * \brief 解析 Provider 标识；未知标识一律按 OpenAI 兼容处理。
     */
    pub fn from_id(id: &str) -> Self {
        match id.trim().to_ascii_lowercase().as_str() {
            "openai" => ProviderKind::OpenAi,
            "anthropic" | "claude" => ProviderKind::Anthropic,
            "demo" => ProviderKind::Synthetic,
            _ => ProviderKind::Compatible,
        }
    }

    /** \brief 该 Provider 签发密钥的固定前缀 */
    pub fn key_prefix(&self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAi => Some("sk-"),
            ProviderKind::Anthropic => Some("sk-ant-"),
            ProviderKind::Compatible | ProviderKind::Synthetic => None,
        }
    }

    pub fn requires_credential(&self) -> bool {
        !matches!(self, ProviderKind::Synthetic)
    }

    /** \brief 走 HTTP 的适配器；本地合成 Provider 返回 None */
    pub fn wire_adapter(&self) -> Option<&'static dyn WireAdapter> {
        match self {
            ProviderKind::OpenAi => Some(&OPENAI),
            ProviderKind::Anthropic => Some(&ANTHROPIC),
            ProviderKind::Compatible => Some(&COMPATIBLE),
            ProviderKind::Synthetic => None,
        }
    }
}

/**
 * \brief 网络调用前的本地校验：凭据存在、前缀正确、通用 Provider 需有基地址。
 */
pub fn validate(kind: ProviderKind, config: &ProviderConfig) -> Result<()> {
    if !kind.requires_credential() {
        return Ok(());
    }
    if config.api_key.trim().is_empty() {
        return Err(GatewayError::MissingCredential {
            provider: config.provider.clone(),
        });
    }
    if let Some(prefix) = kind.key_prefix() {
        if !config.api_key.starts_with(prefix) {
            return Err(GatewayError::MalformedCredential {
                provider: config.provider.clone(),
                expected_prefix: prefix,
            });
        }
    }
    if kind == ProviderKind::Compatible && config.base_url.trim().is_empty() {
        return Err(GatewayError::MissingEndpoint {
            provider: config.provider.clone(),
        });
    }
    Ok(())
}

/**
 * \brief 调度入口：合并配置、选择适配器并执行调用。
 */
pub struct Gateway {
    store: Arc<dyn ConfigStore>,
    client: reqwest::Client,
    synthetic: SyntheticAdapter,
    request_timeout: Duration,
}

impl Gateway {
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        Self::with_store(Arc::new(MemoryStore::new()), settings)
    }

    pub fn with_store(store: Arc<dyn ConfigStore>, settings: &HttpSettings) -> Result<Self> {
        let client = settings
            .build_client()
            .map_err(|e| GatewayError::Internal(format!("build http client failed: {}", e)))?;
        Ok(Self {
            store,
            client,
            synthetic: SyntheticAdapter::from_settings(settings),
            request_timeout: settings.request_timeout,
        })
    }

    /**
     * \brief 按优先级解析生效配置：内联配置 > 运行时存储 > 环境变量默认值。
     *
     * 内联配置整体替换，不做字段合并；不会失败，缺失字段保持为空。
     */
    pub fn resolve(&self, provider: &str, inline: Option<&ProviderConfig>) -> ProviderConfig {
        if let Some(inline) = inline {
            let mut cfg = inline.clone();
            if cfg.provider.is_empty() {
                cfg.provider = provider.to_string();
            }
            return cfg;
        }
        self.store
            .get(provider)
            .unwrap_or_else(|| env_defaults(provider))
    }

    fn prepare(&self, request: ChatRequest) -> Result<(ProviderKind, ProviderConfig, ChatRequest)> {
        tracing::info!(
            provider = %request.provider,
            model = %request.model,
            messages = request.messages.len(),
            stream = request.stream,
            "chat request received"
        );
        if request.messages.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "messages must not be empty".to_string(),
            ));
        }
        let kind = ProviderKind::from_id(&request.provider);
        let config = self.resolve(&request.provider, request.inline_config.as_ref());
        tracing::debug!(
            provider = %request.provider,
            kind = ?kind,
            has_key = !config.api_key.is_empty(),
            key_len = config.api_key.len(),
            base_url = %config.base_url,
            "adapter selected"
        );
        validate(kind, &config)?;

        let mut request = request;
        if request.model.trim().is_empty() {
            request.model = config.model.clone();
        }
        Ok((kind, config, request))
    }

    /**
     * \brief 非流式聊天；stream=true 的请求应走 chat_stream。
     */
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        if request.stream {
            return Err(GatewayError::InvalidRequest(
                "stream=true requests must use the streaming endpoint".to_string(),
            ));
        }
        let provider = request.provider.clone();
        let (kind, config, request) = self.prepare(request)?;
        let result = match kind.wire_adapter() {
            None => self.synthetic.chat(&request).await,
            Some(adapter) => {
                llm::chat_once(&self.client, adapter, &config, &request, self.request_timeout).await
            }
        };
        match &result {
            Ok(resp) => tracing::info!(
                provider = %provider,
                chars = resp.message.content.chars().count(),
                "upstream call succeeded"
            ),
            Err(err) => tracing::warn!(provider = %provider, error = %err, "upstream call failed"),
        }
        result
    }

    /**
     * \brief 流式聊天。配置类错误在流创建前返回；流一旦创建，任何故障都转为 Error + Done。
     */
    pub fn chat_stream(&self, request: ChatRequest) -> Result<EventStream> {
        let (kind, config, request) = self.prepare(request)?;
        Ok(match kind.wire_adapter() {
            None => self.synthetic.stream(&request),
            Some(adapter) => normalize(
                llm::open_stream(self.client.clone(), adapter, config, request),
                adapter.chunk_parser(),
                adapter.label(),
            ),
        })
    }

    /**
     * \brief 保存 Provider 配置（整体替换，后写者覆盖）。
     */
    pub fn save_config(&self, config: ProviderConfig) -> Result<()> {
        if config.provider.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "provider must not be empty".to_string(),
            ));
        }
        tracing::info!(provider = %config.provider, has_key = !config.api_key.is_empty(), "config saved");
        self.store.set(config)
    }

    /**
     * \brief 读取脱敏后的配置；未保存时回退到环境变量默认值。
     */
    pub fn get_config(&self, provider: &str) -> ProviderConfig {
        self.resolve(provider, None).redacted()
    }

    /**
     * \brief 列出 Provider 可用的聊天模型。
     */
    pub async fn list_models(
        &self,
        provider: &str,
        inline: Option<&ProviderConfig>,
    ) -> Result<ModelCatalog> {
        let kind = ProviderKind::from_id(provider);
        let config = self.resolve(provider, inline);
        catalog::list_models(&self.client, kind, &config).await
    }

    /**
     * \brief 使用未保存的配置发送一条极短的测试消息。
     */
    pub async fn test_connection(&self, config: ProviderConfig) -> Result<ConnectionReport> {
        let kind = ProviderKind::from_id(&config.provider);
        let Some(adapter) = kind.wire_adapter() else {
            tokio::time::sleep(self.synthetic_probe_delay()).await;
            return Ok(ConnectionReport {
                status: "success".to_string(),
                message: "Demo connection test succeeded".to_string(),
                response: "Demo mode is ready, you can start chatting.".to_string(),
            });
        };
        validate(kind, &config)?;

        let mut request = ChatRequest::new(
            config.provider.clone(),
            config.model.clone(),
            vec![Message::user(CONNECTION_TEST_PROMPT)],
        );
        request.temperature = 0.1;
        request.max_tokens = 50;
        let resp =
            llm::chat_once(&self.client, adapter, &config, &request, self.request_timeout).await?;
        tracing::info!(provider = %config.provider, "connection test succeeded");
        Ok(ConnectionReport {
            status: "success".to_string(),
            message: format!("{} connection test succeeded", adapter.label()),
            response: resp.message.content.chars().take(100).collect(),
        })
    }

    fn synthetic_probe_delay(&self) -> std::time::Duration {
        self.synthetic.latency() / 2
    }
}
