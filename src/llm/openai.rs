//! OpenAI Chat Completions backend.
//!
//! Streams `/v1/chat/completions` SSE, forwarding content deltas as they
//! arrive and assembling tool call argument fragments (which OpenAI splits
//! across chunks, keyed by index) into complete calls on the final chunk.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::config::OpenAiConfig;
use crate::error::LlmError;
use crate::llm::provider::{
    parse_retry_after, ChatMessage, LlmProvider, Role, StreamChunk, ToolCall, ToolDefinition,
    TurnRequest,
};

pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        if config.api_key.is_none() {
            return Err(LlmError::AuthFailed {
                provider: "openai".to_string(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { config, client })
    }

    fn to_api_messages(messages: &[ChatMessage]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::System => "system".into(),
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::Tool => "tool".into(),
                },
                content: Some(m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn stream_turn(
        &self,
        request: TurnRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, LlmError>>, LlmError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| LlmError::AuthFailed {
                provider: "openai".to_string(),
            })?;

        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": Self::to_api_messages(&request.messages),
            "stream": true,
        });
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(model = %self.config.model, "Sending OpenAI streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key.expose_secret()))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(LlmError::AuthFailed {
                provider: "openai".to_string(),
            });
        }
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(LlmError::RateLimited {
                provider: "openai".to_string(),
                retry_after,
            });
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "OpenAI returned an error");
            return Err(LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("status {status}: {error_body}"),
            });
        }

        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();
            // Tool call fragments, keyed by choice index
            let mut accumulators: HashMap<u32, ToolCallAccumulator> = HashMap::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(LlmError::StreamInterrupted {
                                provider: "openai".to_string(),
                                reason: e.to_string(),
                            }))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let data = data.trim();

                    if data == "[DONE]" {
                        let _ = tx.send(Ok(final_chunk(&accumulators))).await;
                        return;
                    }

                    match serde_json::from_str::<StreamResponse>(data) {
                        Ok(parsed) => {
                            let Some(choice) = parsed.choices.first() else {
                                continue;
                            };
                            if let Some(deltas) = &choice.delta.tool_calls {
                                for delta in deltas {
                                    let acc = accumulators.entry(delta.index).or_default();
                                    if let Some(id) = &delta.id {
                                        acc.id = id.clone();
                                    }
                                    if let Some(func) = &delta.function {
                                        if let Some(name) = &func.name {
                                            acc.name = name.clone();
                                        }
                                        if let Some(args) = &func.arguments {
                                            acc.arguments.push_str(args);
                                        }
                                    }
                                }
                            }
                            if let Some(text) =
                                choice.delta.content.as_ref().filter(|c| !c.is_empty())
                            {
                                let chunk = StreamChunk {
                                    text: Some(text.clone()),
                                    ..Default::default()
                                };
                                if tx.send(Ok(chunk)).await.is_err() {
                                    return; // receiver dropped
                                }
                            }
                        }
                        Err(e) => {
                            trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(Ok(final_chunk(&accumulators))).await;
        });

        Ok(rx)
    }
}

fn final_chunk(accumulators: &HashMap<u32, ToolCallAccumulator>) -> StreamChunk {
    let mut indexed: Vec<_> = accumulators.iter().collect();
    indexed.sort_by_key(|(index, _)| **index);
    StreamChunk {
        text: None,
        tool_calls: indexed.into_iter().map(|(_, acc)| acc.to_tool_call()).collect(),
        done: true,
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// --- Streaming SSE types ---

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta; arguments arrive incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn to_tool_call(&self) -> ToolCall {
        ToolCall {
            id: self.id.clone(),
            name: self.name.clone(),
            arguments: self.arguments.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_conversion_maps_roles() {
        let messages = vec![
            ChatMessage::system("You schedule fish farm shifts"),
            ChatMessage::user("assign Udi to oxygen tomorrow"),
        ];
        let api = OpenAiProvider::to_api_messages(&messages);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].role, "user");
    }

    #[test]
    fn assistant_tool_calls_round_trip_into_api_shape() {
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "assign_task".to_string(),
            arguments: r#"{"worker_name":"Udi"}"#.to_string(),
        };
        let msg = ChatMessage::assistant_with_tools("", vec![call]);
        let api = OpenAiProvider::to_api_messages(&[msg]);
        let tc = api[0].tool_calls.as_ref().unwrap();
        assert_eq!(tc[0].r#type, "function");
        assert_eq!(tc[0].function.name, "assign_task");
    }

    #[test]
    fn tool_result_carries_call_id() {
        let call = ToolCall {
            id: "call_9".to_string(),
            name: "get_schedule".to_string(),
            arguments: "{}".to_string(),
        };
        let api = OpenAiProvider::to_api_messages(&[ChatMessage::tool_result(&call, "empty week")]);
        assert_eq!(api[0].role, "tool");
        assert_eq!(api[0].tool_call_id.as_deref(), Some("call_9"));
    }

    #[test]
    fn parse_content_delta() {
        let data = r#"{"choices":[{"delta":{"content":"Assigned"},"finish_reason":null}]}"#;
        let parsed: StreamResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.choices[0].delta.content.as_deref(), Some("Assigned"));
    }

    #[test]
    fn parse_tool_call_delta_fragments() {
        let first = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"assign_task","arguments":""}}]},"finish_reason":null}]}"#;
        let second = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"worker_name\""}}]},"finish_reason":null}]}"#;

        let mut acc = ToolCallAccumulator::default();
        for data in [first, second] {
            let parsed: StreamResponse = serde_json::from_str(data).unwrap();
            let delta = &parsed.choices[0].delta.tool_calls.as_ref().unwrap()[0];
            if let Some(id) = &delta.id {
                acc.id = id.clone();
            }
            if let Some(func) = &delta.function {
                if let Some(name) = &func.name {
                    acc.name = name.clone();
                }
                if let Some(args) = &func.arguments {
                    acc.arguments.push_str(args);
                }
            }
        }

        let call = acc.to_tool_call();
        assert_eq!(call.id, "call_a");
        assert_eq!(call.name, "assign_task");
        assert_eq!(call.arguments, "{\"worker_name\"");
    }

    #[test]
    fn final_chunk_orders_calls_by_index() {
        let mut accumulators = HashMap::new();
        accumulators.insert(
            1,
            ToolCallAccumulator {
                id: "call_b".to_string(),
                name: "second".to_string(),
                arguments: "{}".to_string(),
            },
        );
        accumulators.insert(
            0,
            ToolCallAccumulator {
                id: "call_a".to_string(),
                name: "first".to_string(),
                arguments: "{}".to_string(),
            },
        );
        let chunk = final_chunk(&accumulators);
        assert!(chunk.done);
        assert_eq!(chunk.tool_calls[0].name, "first");
        assert_eq!(chunk.tool_calls[1].name, "second");
    }

    #[test]
    fn missing_key_fails_construction() {
        let config = OpenAiConfig {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
        };
        assert!(OpenAiProvider::new(config).is_err());
    }
}
