use reqwest::header::HeaderMap;
use serde_json::Value;

use super::{bearer_headers, openai_body, openai_style_error, openai_usage, render_text, WireAdapter};
use crate::{
    error::{GatewayError, Result},
    models::{ChatRequest, ChatResponse, ProviderConfig},
    stream::ChunkParser,
};

/** \brief OpenAI 兼容端点的标准路径后缀 */
pub const COMPLETIONS_SUFFIX: &str = "/chat/completions";

/**
 * \brief 通用 / OpenAI 兼容适配器，对响应结构做宽松解析。
 */
#[derive(Debug, Clone, Copy, Default)]
pub struct CompatibleAdapter;

/**
 * \brief 去掉补全路径后缀，得到 API 根地址。
 */
pub fn api_root(base_url: &str) -> &str {
    let base = base_url.trim_end_matches('/');
    base.strip_suffix(COMPLETIONS_SUFFIX).unwrap_or(base)
}

/**
 * \brief 按优先级提取回复正文：choices → content → response，首个命中者生效。
 */
fn extract_content(body: &Value) -> Result<String> {
    let content = if let Some(first) = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
    {
        if let Some(content) = first.get("message").and_then(|m| m.get("content")) {
            render_text(content)
        } else if let Some(text) = first.get("text") {
            render_text(text)
        } else {
            String::new()
        }
    } else if let Some(content) = body.get("content") {
        match content {
            Value::Array(blocks) if !blocks.is_empty() => blocks[0]
                .get("text")
                .map(render_text)
                .unwrap_or_else(|| content.to_string()),
            Value::Array(_) => String::new(),
            scalar => render_text(scalar),
        }
    } else if let Some(response) = body.get("response") {
        render_text(response)
    } else {
        return Err(GatewayError::protocol("unrecognized response shape"));
    };

    if content.is_empty() {
        return Err(GatewayError::protocol("empty response content"));
    }
    Ok(content)
}

fn parse_stream_chunk(payload: &str) -> Option<String> {
    let v: Value = serde_json::from_str(payload).ok()?;
    let choice = v.get("choices")?.get(0)?;
    choice
        .get("delta")
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())
        .or_else(|| choice.get("text").and_then(|t| t.as_str()))
        .map(|s| s.to_string())
}

impl WireAdapter for CompatibleAdapter {
    fn label(&self) -> &'static str {
        "Custom"
    }

    fn endpoint(&self, config: &ProviderConfig) -> Result<String> {
        let base = config.base_url.trim_end_matches('/');
        if base.is_empty() {
            return Err(GatewayError::MissingEndpoint {
                provider: config.provider.clone(),
            });
        }
        if base.ends_with(COMPLETIONS_SUFFIX) {
            Ok(base.to_string())
        } else {
            Ok(format!("{}{}", base, COMPLETIONS_SUFFIX))
        }
    }

    fn headers(&self, config: &ProviderConfig) -> Result<HeaderMap> {
        bearer_headers(&config.api_key)
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> Value {
        openai_body(request, stream)
    }

    fn parse_response(&self, body: &Value) -> Result<ChatResponse> {
        let content = extract_content(body)?;
        Ok(ChatResponse::assistant(content, openai_usage(body)))
    }

    fn chunk_parser(&self) -> ChunkParser {
        parse_stream_chunk
    }

    fn unauthorized_hint(&self) -> &'static str {
        "authentication failed, check the API key, base URL and auth scheme"
    }

    fn error_message(&self, body: &Value) -> Option<String> {
        openai_style_error(body).or_else(|| {
            body.get("message")
                .and_then(|m| m.as_str())
                .map(|s| s.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cfg(base_url: &str) -> ProviderConfig {
        ProviderConfig {
            provider: "custom".into(),
            api_key: "key".into(),
            base_url: base_url.into(),
            model: "m".into(),
        }
    }

    fn text_of(body: Value) -> Result<String> {
        CompatibleAdapter
            .parse_response(&body)
            .map(|r| r.message.content)
    }

    #[test]
    fn test_endpoint_appends_suffix_once() {
        assert_eq!(
            CompatibleAdapter
                .endpoint(&cfg("https://api.siliconflow.cn/v1"))
                .expect("endpoint"),
            "https://api.siliconflow.cn/v1/chat/completions"
        );
        assert_eq!(
            CompatibleAdapter
                .endpoint(&cfg("https://api.siliconflow.cn/v1/chat/completions/"))
                .expect("endpoint"),
            "https://api.siliconflow.cn/v1/chat/completions"
        );
        let err = CompatibleAdapter.endpoint(&cfg("")).expect_err("no base");
        assert!(matches!(err, GatewayError::MissingEndpoint { .. }));
    }

    #[test]
    fn test_api_root_strips_suffix() {
        assert_eq!(api_root("https://x.test/v1/chat/completions"), "https://x.test/v1");
        assert_eq!(api_root("https://x.test/v1/"), "https://x.test/v1");
    }

    #[test]
    fn test_choices_shape() {
        let msg = json!({"choices": [{"message": {"content": "from message"}}]});
        assert_eq!(text_of(msg).expect("choices.message"), "from message");
        let legacy = json!({"choices": [{"text": "from text"}]});
        assert_eq!(text_of(legacy).expect("choices.text"), "from text");
    }

    #[test]
    fn test_content_scalar_shape() {
        assert_eq!(text_of(json!({"content": "plain"})).expect("scalar"), "plain");
        assert_eq!(text_of(json!({"content": 42})).expect("number"), "42");
    }

    #[test]
    fn test_content_list_shape() {
        let body = json!({"content": [{"type": "text", "text": "block"}]});
        assert_eq!(text_of(body).expect("list"), "block");
        let no_text = json!({"content": [{"type": "image"}]});
        assert_eq!(
            text_of(no_text).expect("rendered list"),
            r#"[{"type":"image"}]"#
        );
    }

    #[test]
    fn test_response_shape() {
        assert_eq!(text_of(json!({"response": "ollama says"})).expect("response"), "ollama says");
    }

    #[test]
    fn test_unrecognized_shape() {
        let err = text_of(json!({"output": "??"})).expect_err("unrecognized");
        match err {
            GatewayError::UpstreamProtocolViolation { reason } => {
                assert_eq!(reason, "unrecognized response shape")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_empty_content_differs_from_absent() {
        let err = text_of(json!({"choices": [{"message": {"content": ""}}]})).expect_err("empty");
        match err {
            GatewayError::UpstreamProtocolViolation { reason } => {
                assert_eq!(reason, "empty response content")
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(text_of(json!({"response": null})).is_err());
    }

    #[test]
    fn test_first_match_wins() {
        let body = json!({
            "choices": [{"message": {"content": "choice"}}],
            "content": "content",
            "response": "response"
        });
        assert_eq!(text_of(body).expect("priority"), "choice");
    }

    #[test]
    fn test_error_message_falls_back_to_top_level() {
        let v = json!({"message": "quota exceeded"});
        assert_eq!(
            CompatibleAdapter.error_message(&v),
            Some("quota exceeded".to_string())
        );
    }

    #[test]
    fn test_stream_chunk_accepts_text_choices() {
        let parse = CompatibleAdapter.chunk_parser();
        assert_eq!(parse(r#"{"choices":[{"text":"t"}]}"#), Some("t".to_string()));
        assert_eq!(
            parse(r#"{"choices":[{"delta":{"content":"d"}}]}"#),
            Some("d".to_string())
        );
        assert_eq!(parse(r#"{"event":"ping"}"#), None);
    }
}
