use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};

use crate::{
    error::{GatewayError, Result},
    models::{ChatRequest, ChatResponse, Message, ProviderConfig, Usage},
    stream::ChunkParser,
};

pub mod anthropic;
pub mod compatible;
pub mod openai;
pub mod synthetic;

pub use anthropic::AnthropicAdapter;
pub use compatible::CompatibleAdapter;
pub use openai::OpenAiAdapter;
pub use synthetic::SyntheticAdapter;

/**
 * \brief 走 HTTP 的 Provider 适配器：规范请求 → 上游报文，上游报文 → 规范回复/增量。
 */
pub trait WireAdapter: Send + Sync {
    /** \brief 日志与错误信息中使用的名称 */
    fn label(&self) -> &'static str;

    /** \brief 聊天补全端点；缺少基地址时报 MissingEndpoint */
    fn endpoint(&self, config: &ProviderConfig) -> Result<String>;

    /** \brief 鉴权及内容类型请求头 */
    fn headers(&self, config: &ProviderConfig) -> Result<HeaderMap>;

    fn build_body(&self, request: &ChatRequest, stream: bool) -> Value;

    fn parse_response(&self, body: &Value) -> Result<ChatResponse>;

    /** \brief 流式 `data:` 载荷的增量提取函数 */
    fn chunk_parser(&self) -> ChunkParser;

    /** \brief 401 时附加的凭据检查提示 */
    fn unauthorized_hint(&self) -> &'static str;

    /** \brief 从错误响应体中提取可读信息 */
    fn error_message(&self, body: &Value) -> Option<String> {
        openai_style_error(body)
    }
}

/**
 * \brief 发送聊天请求并校验状态码。
 * \param timeout 整个请求的时限；流式调用传 None，只受客户端读超时约束
 */
async fn send(
    client: &reqwest::Client,
    adapter: &dyn WireAdapter,
    config: &ProviderConfig,
    request: &ChatRequest,
    timeout: Option<Duration>,
) -> Result<reqwest::Response> {
    let stream = timeout.is_none();
    let url = adapter.endpoint(config)?;
    let headers = adapter.headers(config)?;
    let body = adapter.build_body(request, stream);
    tracing::debug!(
        provider = adapter.label(),
        url = %url,
        model = %request.model,
        messages = request.messages.len(),
        stream,
        "sending upstream request"
    );

    let mut builder = client.post(&url).headers(headers).json(&body);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    let resp = builder.send().await?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let err = upstream_error(adapter, status.as_u16(), &text);
        tracing::warn!(provider = adapter.label(), status = status.as_u16(), error = %err, "upstream rejected request");
        return Err(err);
    }
    Ok(resp)
}

/**
 * \brief 非流式调用，返回规范回复；读取响应体也计入 timeout。
 */
pub async fn chat_once(
    client: &reqwest::Client,
    adapter: &dyn WireAdapter,
    config: &ProviderConfig,
    request: &ChatRequest,
    timeout: Duration,
) -> Result<ChatResponse> {
    let resp = send(client, adapter, config, request, Some(timeout)).await?;
    let v: Value = resp.json().await?;
    adapter.parse_response(&v)
}

/**
 * \brief 建立流式调用，返回上游原始字节流。
 */
pub async fn open_stream(
    client: reqwest::Client,
    adapter: &'static dyn WireAdapter,
    config: ProviderConfig,
    request: ChatRequest,
) -> Result<impl Stream<Item = Result<Bytes>> + Send + 'static> {
    let resp = send(&client, adapter, &config, &request, None).await?;
    Ok(resp.bytes_stream().map(|r| r.map_err(GatewayError::from)))
}

/**
 * \brief 将非 2xx 响应转换为 UpstreamHttp，401 附加适配器专属提示。
 */
pub fn upstream_error(adapter: &dyn WireAdapter, status: u16, body: &str) -> GatewayError {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| adapter.error_message(&v))
        .unwrap_or_else(|| format!("HTTP {}", status));
    let mut message = format!("{} API error: {}", adapter.label(), detail);
    if status == 401 {
        message.push_str(" - ");
        message.push_str(adapter.unauthorized_hint());
    }
    GatewayError::UpstreamHttp { status, message }
}

/**
 * \brief 读取 `{"error": {"message": ...}}` 或 `{"error": "..."}`。
 */
fn openai_style_error(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::String(s) => Some(s.clone()),
        err => err
            .get("message")
            .and_then(|m| m.as_str())
            .map(|s| s.to_string()),
    }
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| {
        GatewayError::InvalidRequest(
            "API key contains characters that are not allowed in an HTTP header".to_string(),
        )
    })
}

/**
 * \brief Bearer 鉴权请求头，供 OpenAI 风格的适配器共用。
 */
fn bearer_headers(api_key: &str) -> Result<HeaderMap> {
    let mut headers = json_headers();
    headers.insert(
        reqwest::header::AUTHORIZATION,
        header_value(&format!("Bearer {}", api_key))?,
    );
    Ok(headers)
}

fn chat_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
        .collect()
}

/**
 * \brief OpenAI 风格请求体：消息 1:1 透传，参数置于顶层。
 */
fn openai_body(request: &ChatRequest, stream: bool) -> Value {
    let mut body = json!({
        "model": request.model,
        "messages": chat_messages(&request.messages),
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    });
    if stream {
        body["stream"] = json!(true);
    }
    body
}

/**
 * \brief 解析 OpenAI 风格的 usage；缺少 total_tokens 时取两者之和。
 */
fn openai_usage(v: &Value) -> Option<Usage> {
    let usage = v.get("usage")?;
    let prompt = usage.get("prompt_tokens")?.as_u64()?;
    let completion = usage.get("completion_tokens")?.as_u64()?;
    let total = usage
        .get("total_tokens")
        .and_then(|t| t.as_u64())
        .unwrap_or(prompt + completion);
    Some(Usage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: total,
    })
}

fn openai_delta(payload: &str) -> Option<String> {
    let v: Value = serde_json::from_str(payload).ok()?;
    v.get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

/**
 * \brief 标量值转文本：字符串原样，null 为空，其余按 JSON 渲染。
 */
fn render_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
