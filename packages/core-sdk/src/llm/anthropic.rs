use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Value};

use super::{header_value, json_headers, WireAdapter};
use crate::{
    error::{GatewayError, Result},
    models::{ChatRequest, ChatResponse, Message, ProviderConfig, Role, Usage},
    stream::ChunkParser,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/**
 * \brief Anthropic Messages API 适配器。
 */
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicAdapter;

/**
 * \brief 拆分出顶层 system 字段，其余消息按原顺序保留。
 *
 * 多条 system 消息时以最后一条为准。
 */
fn split_system(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system = None;
    let mut items = Vec::new();
    for msg in messages {
        match msg.role {
            Role::System => system = Some(msg.content.clone()),
            Role::User | Role::Assistant => items.push(json!({
                "role": msg.role.as_str(),
                "content": msg.content,
            })),
        }
    }
    (system, items)
}

fn parse_stream_chunk(payload: &str) -> Option<String> {
    let v: Value = serde_json::from_str(payload).ok()?;
    if v.get("type")?.as_str()? != "content_block_delta" {
        return None;
    }
    v.get("delta")?
        .get("text")?
        .as_str()
        .map(|s| s.to_string())
}

impl WireAdapter for AnthropicAdapter {
    fn label(&self) -> &'static str {
        "Anthropic"
    }

    fn endpoint(&self, config: &ProviderConfig) -> Result<String> {
        let base = config.base_url.trim_end_matches('/');
        if base.is_empty() {
            return Err(GatewayError::MissingEndpoint {
                provider: config.provider.clone(),
            });
        }
        Ok(format!("{}/v1/messages", base))
    }

    fn headers(&self, config: &ProviderConfig) -> Result<HeaderMap> {
        let mut headers = json_headers();
        headers.insert("x-api-key", header_value(&config.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        Ok(headers)
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let (system, messages) = split_system(&request.messages);
        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": messages,
        });
        if let Some(sys) = system {
            body["system"] = json!(sys);
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    fn parse_response(&self, body: &Value) -> Result<ChatResponse> {
        let first = body
            .get("content")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| GatewayError::protocol("Anthropic response has no content blocks"))?;
        let text = first
            .get("text")
            .and_then(|t| t.as_str())
            .ok_or_else(|| GatewayError::protocol("Anthropic content block has no text"))?;
        let usage = body.get("usage").and_then(|u| {
            let input = u.get("input_tokens")?.as_u64()?;
            let output = u.get("output_tokens")?.as_u64()?;
            Some(Usage::new(input, output))
        });
        Ok(ChatResponse::assistant(text, usage))
    }

    fn chunk_parser(&self) -> ChunkParser {
        parse_stream_chunk
    }

    fn unauthorized_hint(&self) -> &'static str {
        "check that the Anthropic API key is correct and still valid"
    }
}
