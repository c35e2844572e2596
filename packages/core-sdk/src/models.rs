use serde::{Deserialize, Serialize};

/**
 * \brief 消息角色：system/user/assistant。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/**
 * \brief 消息结构，与 OpenAI Chat 消息格式对齐。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /** \brief 角色 */
    pub role: Role,
    /** \brief 内容 */
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/**
 * \brief Provider 配置：凭据、基地址与默认模型。
 */
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /** \brief Provider 标识，如 openai/anthropic/demo/custom */
    pub provider: String,
    /** \brief API Key（敏感信息，读取时需脱敏） */
    #[serde(default)]
    pub api_key: String,
    /** \brief API 基地址 */
    #[serde(default)]
    pub base_url: String,
    /** \brief 默认模型名 */
    #[serde(default)]
    pub model: String,
}

impl ProviderConfig {
    /**
     * \brief 返回脱敏副本：存在密钥时替换为占位符，否则为空串。
     */
    pub fn redacted(&self) -> Self {
        Self {
            api_key: if self.api_key.is_empty() {
                String::new()
            } else {
                REDACTED_KEY.to_string()
            },
            ..self.clone()
        }
    }
}

/** \brief 脱敏后的密钥占位符。 */
pub const REDACTED_KEY: &str = "***";

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2048
}

/**
 * \brief 客户端聊天请求。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /** \brief 有序会话消息，最后一条通常为用户提问 */
    pub messages: Vec<Message>,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /** \brief 采样温度，原样透传 */
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /** \brief 是否流式返回；决定两种互斥的输出形态 */
    #[serde(default)]
    pub stream: bool,
    /** \brief 请求内联的 Provider 配置，优先级最高（整体替换） */
    #[serde(default)]
    pub inline_config: Option<ProviderConfig>,
}

impl ChatRequest {
    pub fn new(provider: impl Into<String>, model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            messages,
            provider: provider.into(),
            model: model.into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            stream: false,
            inline_config: None,
        }
    }

    /**
     * \brief 最后一条消息的正文，会话为空时返回 None。
     */
    pub fn latest_text(&self) -> Option<&str> {
        self.messages.last().map(|m| m.content.as_str())
    }
}

/**
 * \brief 上游报告的用量统计。
 */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/**
 * \brief 非流式回复；message.role 恒为 assistant。
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: Message,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatResponse {
    pub fn assistant(content: impl Into<String>, usage: Option<Usage>) -> Self {
        Self {
            message: Message::assistant(content),
            usage,
        }
    }
}

/**
 * \brief 规范化后的流式事件；Done 总是最后且仅出现一次。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Content { delta: String, accumulated: String },
    Error { message: String },
    Done,
}

/**
 * \brief 模型目录条目。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    /** \brief 创建时间（Unix 秒），未知时为 0 */
    pub created: i64,
    pub owned_by: String,
}

impl ModelInfo {
    pub fn chat(
        id: impl Into<String>,
        description: impl Into<String>,
        created: i64,
        owned_by: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            kind: "chat".to_string(),
            created,
            owned_by: owned_by.into(),
        }
    }
}

pub type ModelCatalog = Vec<ModelInfo>;

/**
 * \brief 连接测试结果。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionReport {
    pub status: String,
    pub message: String,
    /** \brief 上游回复的前 100 个字符 */
    pub response: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_defaults() {
        let req: ChatRequest =
            serde_json::from_str(r#"{"messages":[{"role":"user","content":"hi"}]}"#)
                .expect("parse request");
        assert_eq!(req.provider, "openai");
        assert_eq!(req.model, "gpt-3.5-turbo");
        assert_eq!(req.max_tokens, 2048);
        assert!(!req.stream);
        assert!(req.inline_config.is_none());
        assert_eq!(req.messages[0].role, Role::User);
    }

    #[test]
    fn test_redacted_hides_key() {
        let cfg = ProviderConfig {
            provider: "openai".into(),
            api_key: "sk-secret".into(),
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o".into(),
        };
        let red = cfg.redacted();
        assert_eq!(red.api_key, REDACTED_KEY);
        assert_eq!(red.base_url, cfg.base_url);

        let empty = ProviderConfig {
            api_key: String::new(),
            ..cfg
        };
        assert_eq!(empty.redacted().api_key, "");
    }

    #[test]
    fn test_stream_event_serialization() {
        let done = serde_json::to_value(StreamEvent::Done).expect("serialize done");
        assert_eq!(done, serde_json::json!({"type": "done"}));
        let content = serde_json::to_value(StreamEvent::Content {
            delta: "a".into(),
            accumulated: "ab".into(),
        })
        .expect("serialize content");
        assert_eq!(content["type"], "content");
        assert_eq!(content["accumulated"], "ab");
    }

    #[test]
    fn test_model_info_type_is_chat() {
        let info = ModelInfo::chat("gpt-4o", "desc", 0, "openai");
        let v = serde_json::to_value(&info).expect("serialize model");
        assert_eq!(v["type"], "chat");
    }
}
