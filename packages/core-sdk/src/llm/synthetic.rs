use std::time::Duration;

use async_stream::stream;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    config::HttpSettings,
    error::{GatewayError, Result},
    models::{ChatRequest, ChatResponse, Usage},
    stream::{from_deltas, EventStream},
};

/** \brief 模拟延迟上限，避免掩盖真实适配器的性能问题 */
const MAX_LATENCY: Duration = Duration::from_millis(1900);

/** \brief 直接调用且会话为空时引用的提示；经 Gateway 的空会话在分发前已被拒绝 */
const FALLBACK_PROMPT: &str = "hello";

/**
 * \brief 本地演示 Provider：不发起网络请求，基于最后一条消息合成回复。
 */
#[derive(Debug, Clone)]
pub struct SyntheticAdapter {
    latency: Duration,
    pause: Duration,
}

impl SyntheticAdapter {
    pub fn new(latency: Duration, pause: Duration) -> Self {
        Self {
            latency: latency.min(MAX_LATENCY),
            pause,
        }
    }

    pub fn from_settings(settings: &HttpSettings) -> Self {
        Self::new(settings.synthetic_latency, settings.synthetic_pause)
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    /**
     * \brief 非流式回复；usage 为提示与回复的字符数。
     */
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let prompt = request.latest_text().unwrap_or(FALLBACK_PROMPT);
        let reply = compose_reply(prompt, &mut StdRng::from_entropy());
        let usage = Usage::new(char_count(prompt), char_count(&reply));
        Ok(ChatResponse::assistant(reply, Some(usage)))
    }

    /**
     * \brief 逐字符输出合成回复，字符间随机短暂停顿。
     */
    pub fn stream(&self, request: &ChatRequest) -> EventStream {
        let prompt = request
            .latest_text()
            .unwrap_or(FALLBACK_PROMPT)
            .to_string();
        let pause = self.pause;
        let deltas = stream! {
            let mut rng = StdRng::from_entropy();
            let reply = compose_reply(&prompt, &mut rng);
            for ch in reply.chars() {
                if !pause.is_zero() {
                    let millis = pause.as_millis().max(4) as u64;
                    let wait = rng.gen_range(millis / 4..=millis);
                    tokio::time::sleep(Duration::from_millis(wait)).await;
                }
                yield Ok::<String, GatewayError>(ch.to_string());
            }
        };
        from_deltas(deltas, "Demo")
    }
}

fn char_count(text: &str) -> u64 {
    text.chars().count() as u64
}

fn compose_reply<R: Rng>(prompt: &str, rng: &mut R) -> String {
    match rng.gen_range(0..5) {
        0 => format!(
            "Hi! I'm the demo assistant. I received your message: \"{}\". This is a simulated reply for testing the app.",
            prompt
        ),
        1 => format!(
            "Thanks for asking \"{}\". Running in demo mode, I can confirm the chat pipeline works. Configure a real API key to talk to an actual model.",
            prompt
        ),
        2 => format!(
            "I'm running in demo mode. You asked: \"{}\". A real model would give a smarter answer; for now you can explore the interface.",
            prompt
        ),
        3 => format!(
            "Welcome! You just said: \"{}\". This is a demo-mode reply. In live mode the model would tailor its answer to your question.",
            prompt
        ),
        _ => format!(
            "Hello from demo mode. For your input \"{}\", a live model could:\n1. Answer questions\n2. Help with writing and code\n3. Analyse problems\n4. Brainstorm ideas\n\nAdd a real API key to unlock all of it!",
            prompt
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Message, Role, StreamEvent};
    use futures_util::StreamExt;

    fn instant() -> SyntheticAdapter {
        SyntheticAdapter::new(Duration::ZERO, Duration::ZERO)
    }

    #[test]
    fn test_latency_is_clamped() {
        let adapter = SyntheticAdapter::new(Duration::from_secs(10), Duration::ZERO);
        assert!(adapter.latency < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_chat_quotes_latest_message_and_counts_chars() {
        let req = ChatRequest::new(
            "demo",
            "demo-model",
            vec![Message::user("first"), Message::user("héllo wörld")],
        );
        let resp = instant().chat(&req).await.expect("chat");
        assert_eq!(resp.message.role, Role::Assistant);
        assert!(resp.message.content.contains("héllo wörld"));
        let usage = resp.usage.expect("usage");
        assert_eq!(usage.prompt_tokens, 11);
        assert_eq!(usage.completion_tokens, resp.message.content.chars().count() as u64);
        assert_eq!(usage.total_tokens, usage.prompt_tokens + usage.completion_tokens);
    }

    #[tokio::test]
    async fn test_stream_emits_one_char_per_event() {
        let req = ChatRequest::new("demo", "demo-model", vec![Message::user("ping")]);
        let events: Vec<StreamEvent> = instant().stream(&req).collect().await;
        assert_eq!(events.last(), Some(&StreamEvent::Done));
        let mut joined = String::new();
        let mut last = String::new();
        for ev in &events[..events.len() - 1] {
            match ev {
                StreamEvent::Content { delta, accumulated } => {
                    assert_eq!(delta.chars().count(), 1);
                    joined.push_str(delta);
                    last = accumulated.clone();
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert_eq!(joined, last);
        assert!(joined.contains("ping"));
    }

    #[tokio::test]
    async fn test_direct_call_with_empty_conversation_uses_fallback_prompt() {
        let req = ChatRequest::new("demo", "demo-model", vec![]);
        let resp = instant().chat(&req).await.expect("chat");
        assert!(resp.message.content.contains(FALLBACK_PROMPT));
        assert_eq!(resp.usage.expect("usage").prompt_tokens, 5);
    }

    #[tokio::test]
    async fn test_small_pause_still_completes() {
        let adapter = SyntheticAdapter::new(Duration::ZERO, Duration::from_millis(1));
        let req = ChatRequest::new("demo", "demo-model", vec![Message::user("x")]);
        let events: Vec<StreamEvent> = adapter.stream(&req).collect().await;
        assert_eq!(events.last(), Some(&StreamEvent::Done));
    }
}
