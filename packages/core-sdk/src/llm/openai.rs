use reqwest::header::HeaderMap;
use serde_json::Value;

use super::{bearer_headers, openai_body, openai_delta, openai_usage, WireAdapter};
use crate::{
    error::{GatewayError, Result},
    models::{ChatRequest, ChatResponse, ProviderConfig},
    stream::ChunkParser,
};

/**
 * \brief OpenAI Chat Completions 适配器。
 */
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiAdapter;

impl WireAdapter for OpenAiAdapter {
    fn label(&self) -> &'static str {
        "OpenAI"
    }

    fn endpoint(&self, config: &ProviderConfig) -> Result<String> {
        let base = config.base_url.trim_end_matches('/');
        if base.is_empty() {
            return Err(GatewayError::MissingEndpoint {
                provider: config.provider.clone(),
            });
        }
        Ok(format!("{}/chat/completions", base))
    }

    fn headers(&self, config: &ProviderConfig) -> Result<HeaderMap> {
        bearer_headers(&config.api_key)
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> Value {
        openai_body(request, stream)
    }

    fn parse_response(&self, body: &Value) -> Result<ChatResponse> {
        let first = body
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .ok_or_else(|| GatewayError::protocol("OpenAI response has no choices"))?;
        let content = first
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| GatewayError::protocol("OpenAI choice has no message content"))?;
        if content.is_empty() {
            return Err(GatewayError::protocol("empty response content"));
        }
        Ok(ChatResponse::assistant(content, openai_usage(body)))
    }

    fn chunk_parser(&self) -> ChunkParser {
        openai_delta
    }

    fn unauthorized_hint(&self) -> &'static str {
        "check that the API key is correct, active and has remaining quota"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use serde_json::json;

    #[test]
    fn test_parse_response_reads_first_choice() {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": "Hello!"}}],
            "usage": {"prompt_tokens": 9, "completion_tokens": 12, "total_tokens": 21}
        });
        let resp = OpenAiAdapter.parse_response(&body).expect("parse");
        assert_eq!(resp.message.role, Role::Assistant);
        assert_eq!(resp.message.content, "Hello!");
        assert_eq!(resp.usage.expect("usage").total_tokens, 21);
    }

    #[test]
    fn test_missing_or_empty_choices_is_protocol_violation() {
        for body in [
            json!({"id": "x"}),
            json!({"choices": []}),
            json!({"choices": "nope"}),
            json!({"choices": [{"finish_reason": "stop"}]}),
            json!({"choices": [{"message": {"content": null}}]}),
            json!({"choices": [{"message": {"role": "assistant", "content": ""}}]}),
        ] {
            let err = OpenAiAdapter.parse_response(&body).expect_err("must fail");
            assert!(matches!(err, GatewayError::UpstreamProtocolViolation { .. }));
        }
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let cfg = ProviderConfig {
            provider: "openai".into(),
            base_url: "https://api.openai.com/v1/".into(),
            ..Default::default()
        };
        assert_eq!(
            OpenAiAdapter.endpoint(&cfg).expect("endpoint"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_chunk_parser_skips_role_only_chunks() {
        let parse = OpenAiAdapter.chunk_parser();
        assert_eq!(
            parse(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#),
            Some("Hi".to_string())
        );
        assert_eq!(parse(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#), None);
        assert_eq!(parse(r#"{"choices":[{"delta":{"content":null}}]}"#), None);
        assert_eq!(parse("garbage"), None);
    }
}
