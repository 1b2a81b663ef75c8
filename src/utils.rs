//! Streaming utilities: SSE parsing and tool-call delta aggregation for the
//! OpenAI-compatible chat-completions protocol.
//!
//! Two challenges live here:
//!
//! 1. **SSE framing.** The wire format is `data: <json>\n\n`, terminated by
//!    `data: [DONE]`. [`parse_sse_stream`] turns the raw HTTP body into a
//!    stream of parsed [`WireChunk`]s.
//! 2. **Tool-call delta aggregation.** Tool call arguments arrive as partial
//!    JSON fragments keyed by an integer index across many chunks; only a
//!    `finish_reason` marks a tool call complete. [`StreamAggregator`] turns
//!    a sequence of [`WireChunk`]s into the [`crate::client::StreamEvent`]s
//!    the agent loop actually consumes. Text deltas, unlike tool calls, are
//!    forwarded immediately rather than buffered to the end of the turn.

use crate::client::{StreamEvent, ToolCall, Usage};
use crate::{Error, Result};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::pin::Pin;

/// One SSE-delivered chat-completion chunk.
#[derive(Debug, Clone, Deserialize)]
pub struct WireChunk {
    #[serde(default)]
    pub choices: Vec<WireChoice>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireChoice {
    #[serde(default)]
    pub delta: WireDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireToolCallDelta {
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<WireFunctionDelta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireFunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// Parses an HTTP streaming response body as Server-Sent Events, yielding
/// parsed [`WireChunk`]s. The `data: [DONE]` sentinel is dropped rather than
/// parsed.
pub fn parse_sse_stream(
    body: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<WireChunk>> + Send>> {
    let mut carry = String::new();
    let stream = body.bytes_stream().filter_map(move |result| {
        let bytes = match result.map_err(Error::Http) {
            Ok(b) => b,
            Err(e) => return futures::future::ready(Some(Err(e))),
        };
        carry.push_str(&String::from_utf8_lossy(&bytes));

        // Find the first complete "data: ...\n" line; keep the remainder
        // buffered for the next poll since chunk boundaries rarely align
        // with SSE event boundaries.
        let out = loop {
            let Some(newline) = carry.find('\n') else {
                break None;
            };
            let line: String = carry.drain(..=newline).collect();
            let line = line.trim_end_matches(['\r', '\n']);
            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };
            if data == "[DONE]" {
                continue;
            }
            match serde_json::from_str::<WireChunk>(data) {
                Ok(chunk) => break Some(Ok(chunk)),
                Err(e) => break Some(Err(Error::stream(format!("Failed to parse chunk: {e}")))),
            }
        };
        futures::future::ready(out)
    });

    Box::pin(stream)
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Accumulates [`WireChunk`]s into [`StreamEvent`]s.
///
/// Text deltas are forwarded as soon as they arrive. Tool-call fragments
/// accumulate per-index until a `finish_reason` appears, at which point each
/// completed call is emitted as one `StreamEvent::ToolCall`. A separate
/// trailing chunk with empty `choices` and a populated `usage` field
/// produces the terminal `StreamEvent::Done`.
pub struct StreamAggregator {
    tool_calls: HashMap<u32, PartialToolCall>,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self {
            tool_calls: HashMap::new(),
        }
    }

    pub fn process_chunk(&mut self, chunk: WireChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if chunk.choices.is_empty() {
            if let Some(usage) = chunk.usage {
                events.push(StreamEvent::Done {
                    usage: Usage {
                        input_tokens: usage.prompt_tokens,
                        output_tokens: usage.completion_tokens,
                    },
                });
            }
            return events;
        }

        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    events.push(StreamEvent::Text { content });
                }
            }

            if let Some(tool_calls) = choice.delta.tool_calls {
                for delta in tool_calls {
                    let entry = self.tool_calls.entry(delta.index).or_default();
                    if let Some(id) = delta.id {
                        entry.id = Some(id);
                    }
                    if let Some(function) = delta.function {
                        if let Some(name) = function.name {
                            entry.name = Some(name);
                        }
                        if let Some(args) = function.arguments {
                            entry.arguments.push_str(&args);
                        }
                    }
                }
            }

            if choice.finish_reason.is_some() {
                for (_, partial) in self.tool_calls.drain() {
                    let (Some(id), Some(name)) = (partial.id, partial.name) else {
                        continue;
                    };
                    let arguments = if partial.arguments.is_empty() {
                        serde_json::json!({})
                    } else {
                        serde_json::from_str(&partial.arguments).unwrap_or(serde_json::json!({}))
                    };
                    events.push(StreamEvent::ToolCall {
                        tool_call: ToolCall { id, name, arguments },
                    });
                }
            }
        }

        events
    }
}

impl Default for StreamAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_delta_emitted_immediately() {
        let mut agg = StreamAggregator::new();
        let chunk = WireChunk {
            choices: vec![WireChoice {
                delta: WireDelta {
                    content: Some("Hello".to_string()),
                    tool_calls: None,
                },
                finish_reason: None,
            }],
            usage: None,
        };
        let events = agg.process_chunk(chunk);
        assert_eq!(events.len(), 1);
        matches!(&events[0], StreamEvent::Text { content } if content == "Hello");
    }

    #[test]
    fn test_tool_call_assembled_on_finish() {
        let mut agg = StreamAggregator::new();
        let chunk1 = WireChunk {
            choices: vec![WireChoice {
                delta: WireDelta {
                    content: None,
                    tool_calls: Some(vec![WireToolCallDelta {
                        index: 0,
                        id: Some("call_1".to_string()),
                        function: Some(WireFunctionDelta {
                            name: Some("bash".to_string()),
                            arguments: Some(r#"{"command":"#.to_string()),
                        }),
                    }]),
                },
                finish_reason: None,
            }],
            usage: None,
        };
        assert!(agg.process_chunk(chunk1).is_empty());

        let chunk2 = WireChunk {
            choices: vec![WireChoice {
                delta: WireDelta {
                    content: None,
                    tool_calls: Some(vec![WireToolCallDelta {
                        index: 0,
                        id: None,
                        function: Some(WireFunctionDelta {
                            name: None,
                            arguments: Some(r#""ls"}"#.to_string()),
                        }),
                    }]),
                },
                finish_reason: Some("tool_calls".to_string()),
            }],
            usage: None,
        };
        let events = agg.process_chunk(chunk2);
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::ToolCall { tool_call } => {
                assert_eq!(tool_call.id, "call_1");
                assert_eq!(tool_call.name, "bash");
                assert_eq!(tool_call.arguments["command"], "ls");
            }
            other => panic!("expected tool call, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_arguments_default_to_empty_object() {
        let mut agg = StreamAggregator::new();
        let chunk = WireChunk {
            choices: vec![WireChoice {
                delta: WireDelta {
                    content: None,
                    tool_calls: Some(vec![WireToolCallDelta {
                        index: 0,
                        id: Some("call_1".to_string()),
                        function: Some(WireFunctionDelta {
                            name: Some("bash".to_string()),
                            arguments: Some("not json".to_string()),
                        }),
                    }]),
                },
                finish_reason: Some("tool_calls".to_string()),
            }],
            usage: None,
        };
        let events = agg.process_chunk(chunk);
        match &events[0] {
            StreamEvent::ToolCall { tool_call } => assert_eq!(tool_call.arguments, serde_json::json!({})),
            other => panic!("expected tool call, got {other:?}"),
        }
    }

    #[test]
    fn test_usage_only_chunk_emits_done() {
        let mut agg = StreamAggregator::new();
        let chunk = WireChunk {
            choices: vec![],
            usage: Some(WireUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
            }),
        };
        let events = agg.process_chunk(chunk);
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Done { usage } => {
                assert_eq!(usage.input_tokens, 10);
                assert_eq!(usage.output_tokens, 5);
            }
            other => panic!("expected done, got {other:?}"),
        }
    }
}
