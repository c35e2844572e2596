use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::{
    error::{GatewayError, Result},
    llm::{compatible::api_root, upstream_error, WireAdapter},
    models::{ModelCatalog, ModelInfo, ProviderConfig},
    router::{validate, ProviderKind},
};

/** \brief 视为聊天模型的标识片段 */
const ALLOW_FRAGMENTS: &[&str] = &[
    "gpt", "o1", "o3", "o4", "chatgpt", "claude", "llama", "qwen", "glm", "deepseek", "mistral",
    "mixtral", "gemini", "gemma", "yi-", "moonshot", "kimi", "chat", "instruct",
];

/** \brief 非聊天模态的标识片段 */
const DENY_FRAGMENTS: &[&str] = &[
    "embed",
    "whisper",
    "tts",
    "speech",
    "audio",
    "dall-e",
    "image",
    "vision-gen",
    "rerank",
    "moderation",
    "transcribe",
    "realtime",
];

const DEMO_MODELS: &[(&str, &str)] = &[
    ("demo-model", "Local demo model that echoes your message"),
    ("demo-model-fast", "Local demo model tuned for quick streaming"),
];

const ANTHROPIC_MODELS: &[(&str, &str)] = &[
    ("claude-3-5-sonnet-20241022", "Claude 3.5 Sonnet, balanced intelligence and speed"),
    ("claude-3-5-haiku-20241022", "Claude 3.5 Haiku, fastest Claude model"),
    ("claude-3-opus-20240229", "Claude 3 Opus, strongest reasoning of the Claude 3 family"),
    ("claude-3-sonnet-20240229", "Claude 3 Sonnet"),
    ("claude-3-haiku-20240307", "Claude 3 Haiku"),
];

const OPENAI_FALLBACK: &[(&str, &str)] = &[
    ("gpt-4o", "GPT-4o, flagship multimodal chat model"),
    ("gpt-4o-mini", "GPT-4o mini, small and affordable"),
    ("gpt-3.5-turbo", "GPT-3.5 Turbo"),
];

const COMPATIBLE_FALLBACK: &[(&str, &str)] = &[
    ("gpt-3.5-turbo", "Default OpenAI-compatible chat model"),
];

fn curated(entries: &[(&str, &str)], owned_by: &str) -> ModelCatalog {
    entries
        .iter()
        .map(|(id, desc)| ModelInfo::chat(*id, *desc, 0, owned_by))
        .collect()
}

/**
 * \brief 按关键词判断模型是否适合聊天：命中允许片段且不含拒绝片段。
 */
pub fn is_chat_model(id: &str) -> bool {
    let id = id.to_ascii_lowercase();
    ALLOW_FRAGMENTS.iter().any(|f| id.contains(f)) && !DENY_FRAGMENTS.iter().any(|f| id.contains(f))
}

/**
 * \brief 解析 `{"data": [...]}` 或裸数组形式的模型列表，按上游顺序过滤。
 */
pub fn filter_models(payload: &Value, default_owner: &str) -> Result<ModelCatalog> {
    let items = payload
        .get("data")
        .and_then(|d| d.as_array())
        .or_else(|| payload.as_array())
        .ok_or_else(|| GatewayError::protocol("unexpected models payload"))?;

    Ok(items
        .iter()
        .filter_map(|item| {
            let id = item
                .get("id")
                .and_then(|s| s.as_str())
                .or_else(|| item.as_str())?;
            if !is_chat_model(id) {
                return None;
            }
            let owned_by = item
                .get("owned_by")
                .and_then(|s| s.as_str())
                .unwrap_or(default_owner);
            let created = item.get("created").and_then(|c| c.as_i64()).unwrap_or(0);
            Some(ModelInfo::chat(
                id,
                format!("{} chat model", owned_by),
                created,
                owned_by,
            ))
        })
        .collect())
}

async fn fetch_models(
    client: &reqwest::Client,
    adapter: &dyn WireAdapter,
    url: String,
    headers: HeaderMap,
) -> Result<Value> {
    let resp = client.get(&url).headers(headers).send().await?;
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(upstream_error(adapter, status.as_u16(), &text));
    }
    Ok(resp.json().await?)
}

/**
 * \brief 列出 Provider 的聊天模型；有发现接口的 Provider 过滤为空时回退到默认列表。
 */
pub async fn list_models(
    client: &reqwest::Client,
    kind: ProviderKind,
    config: &ProviderConfig,
) -> Result<ModelCatalog> {
    let adapter = match kind {
        ProviderKind::Synthetic => return Ok(curated(DEMO_MODELS, "demo")),
        ProviderKind::Anthropic => return Ok(curated(ANTHROPIC_MODELS, "anthropic")),
        ProviderKind::OpenAi | ProviderKind::Compatible => {
            validate(kind, config)?;
            kind.wire_adapter()
                .ok_or_else(|| GatewayError::Internal("missing wire adapter".to_string()))?
        }
    };

    let (fallback, owner) = match kind {
        ProviderKind::OpenAi => (OPENAI_FALLBACK, "openai"),
        _ => (COMPATIBLE_FALLBACK, config.provider.as_str()),
    };
    let url = format!("{}/models", api_root(&config.base_url));
    let payload = fetch_models(client, adapter, url, adapter.headers(config)?).await?;
    let models = filter_models(&payload, owner)?;
    tracing::info!(provider = %config.provider, models = models.len(), "model catalog fetched");
    if models.is_empty() {
        return Ok(curated(fallback, owner));
    }
    Ok(models)
}
