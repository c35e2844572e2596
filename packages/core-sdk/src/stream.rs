use std::{future::Future, pin::Pin};

use async_stream::stream;
use bytes::Bytes;
use futures_util::{pin_mut, Stream, StreamExt};

use crate::{error::Result, models::StreamEvent};

/**
 * \brief 规范化事件流：任意上游形态最终都输出 Content*、可选的 Error 与结尾 Done。
 */
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send + 'static>>;

/**
 * \brief 从单个 `data:` 载荷中提取增量文本；无法解析或无增量时返回 None。
 */
pub type ChunkParser = fn(&str) -> Option<String>;

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Open,
    Draining,
    Closed,
}

/**
 * \brief 单行 SSE 的分类结果。
 */
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Delta(String),
    Sentinel,
    Noise,
}

fn classify(line: &str, parse_chunk: ChunkParser) -> Frame {
    let Some(payload) = line.trim_start().strip_prefix("data:") else {
        return Frame::Noise;
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return Frame::Sentinel;
    }
    match parse_chunk(payload) {
        Some(delta) if !delta.is_empty() => Frame::Delta(delta),
        _ => Frame::Noise,
    }
}

/**
 * \brief 按换行切分字节流，保留未完成的尾部。
 */
#[derive(Debug, Default)]
struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw = self.buf.drain(..=pos).collect::<Vec<u8>>();
            lines.push(decode_line(&raw[..raw.len() - 1]));
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(decode_line(&rest))
    }
}

fn decode_line(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    text.strip_suffix('\r').unwrap_or(&text).to_string()
}

/**
 * \brief 累积已发出的增量；accumulated 恒等于全部 delta 依序拼接。
 */
#[derive(Debug, Default)]
struct Accumulator {
    text: String,
    deltas: usize,
}

impl Accumulator {
    fn push(&mut self, delta: String) -> StreamEvent {
        self.text.push_str(&delta);
        self.deltas += 1;
        StreamEvent::Content {
            delta,
            accumulated: self.text.clone(),
        }
    }
}

fn close(label: &str, acc: &Accumulator, failed: bool, state: &mut StreamState) -> StreamEvent {
    debug_assert_eq!(*state, StreamState::Draining);
    *state = StreamState::Closed;
    tracing::info!(
        provider = label,
        deltas = acc.deltas,
        chars = acc.text.chars().count(),
        failed,
        "stream terminated"
    );
    StreamEvent::Done
}

/**
 * \brief 将上游 SSE 字节流规范化为事件流。
 * \param connect     建立上游连接的 future，失败时转为 Error 事件
 * \param parse_chunk Provider 特定的增量提取函数
 * \param label       日志中的 Provider 名称
 *
 * 丢弃返回的流会同时丢弃上游响应体，从而释放连接。
 */
pub fn normalize<F, S>(connect: F, parse_chunk: ChunkParser, label: &'static str) -> EventStream
where
    F: Future<Output = Result<S>> + Send + 'static,
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    let out = stream! {
        let mut state = StreamState::Open;
        let mut acc = Accumulator::default();
        let mut lines = LineBuffer::default();
        let mut failed = false;

        match connect.await {
            Err(err) => {
                tracing::warn!(provider = label, error = %err, "stream failed before first chunk");
                failed = true;
                state = StreamState::Draining;
                yield StreamEvent::Error { message: err.to_string() };
            }
            Ok(upstream) => {
                pin_mut!(upstream);
                while state == StreamState::Open {
                    match upstream.next().await {
                        Some(Ok(bytes)) => {
                            for line in lines.push(&bytes) {
                                match classify(&line, parse_chunk) {
                                    Frame::Delta(delta) => {
                                        yield acc.push(delta);
                                    }
                                    Frame::Sentinel => {
                                        state = StreamState::Draining;
                                        break;
                                    }
                                    Frame::Noise => {}
                                }
                            }
                        }
                        Some(Err(err)) => {
                            tracing::warn!(provider = label, error = %err, "upstream stream error");
                            failed = true;
                            state = StreamState::Draining;
                            yield StreamEvent::Error { message: err.to_string() };
                        }
                        None => {
                            if let Some(line) = lines.finish() {
                                if let Frame::Delta(delta) = classify(&line, parse_chunk) {
                                    yield acc.push(delta);
                                }
                            }
                            state = StreamState::Draining;
                        }
                    }
                }
            }
        }

        yield close(label, &acc, failed, &mut state);
    };
    Box::pin(out)
}

/**
 * \brief 将已是纯文本增量的流（如本地合成 Provider）包装为同一事件契约。
 */
pub fn from_deltas<S>(deltas: S, label: &'static str) -> EventStream
where
    S: Stream<Item = Result<String>> + Send + 'static,
{
    let out = stream! {
        let mut state = StreamState::Open;
        let mut acc = Accumulator::default();
        let mut failed = false;
        pin_mut!(deltas);
        while state == StreamState::Open {
            match deltas.next().await {
                Some(Ok(delta)) if delta.is_empty() => {}
                Some(Ok(delta)) => {
                    yield acc.push(delta);
                }
                Some(Err(err)) => {
                    failed = true;
                    state = StreamState::Draining;
                    yield StreamEvent::Error { message: err.to_string() };
                }
                None => {
                    state = StreamState::Draining;
                }
            }
        }
        yield close(label, &acc, failed, &mut state);
    };
    Box::pin(out)
}
