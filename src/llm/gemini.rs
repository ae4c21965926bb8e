//! Google Gemini backend.
//!
//! Speaks the native `streamGenerateContent?alt=sse` API rather than an
//! OpenAI compatibility shim. The wire shape differs from OpenAI in three
//! ways this module papers over: roles are `user`/`model`, function calls
//! arrive whole (args as a JSON object, no fragmenting, no call ids), and
//! tool results go back as `functionResponse` parts in a user turn.

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::config::GeminiConfig;
use crate::error::LlmError;
use crate::llm::provider::{
    parse_retry_after, ChatMessage, LlmProvider, Role, StreamChunk, ToolCall, ToolDefinition,
    TurnRequest,
};

pub struct GeminiProvider {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Result<Self, LlmError> {
        if config.api_key.is_none() {
            return Err(LlmError::AuthFailed {
                provider: "gemini".to_string(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: "gemini".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { config, client })
    }

    /// Split the conversation into Gemini's system instruction and
    /// alternating contents.
    fn to_api_request(request: &TurnRequest) -> ApiRequest {
        let mut system_text = String::new();
        let mut contents: Vec<Content> = Vec::new();
        // Call names, recovered from the assistant messages that issued them
        let mut call_names: std::collections::HashMap<String, String> =
            std::collections::HashMap::new();

        for message in &request.messages {
            match message.role {
                Role::System => {
                    if !system_text.is_empty() {
                        system_text.push('\n');
                    }
                    system_text.push_str(&message.content);
                }
                Role::User => contents.push(Content {
                    role: "user".into(),
                    parts: vec![Part::text(&message.content)],
                }),
                Role::Assistant => {
                    let mut parts = Vec::new();
                    if !message.content.is_empty() {
                        parts.push(Part::text(&message.content));
                    }
                    for call in &message.tool_calls {
                        call_names.insert(call.id.clone(), call.name.clone());
                        let args = serde_json::from_str(&call.arguments)
                            .unwrap_or(serde_json::Value::Object(Default::default()));
                        parts.push(Part {
                            text: None,
                            function_call: Some(FunctionCall {
                                name: call.name.clone(),
                                args,
                            }),
                            function_response: None,
                        });
                    }
                    if !parts.is_empty() {
                        contents.push(Content {
                            role: "model".into(),
                            parts,
                        });
                    }
                }
                Role::Tool => {
                    let name = message
                        .tool_call_id
                        .as_ref()
                        .and_then(|id| call_names.get(id))
                        .cloned()
                        .unwrap_or_default();
                    let response = serde_json::from_str(&message.content).unwrap_or_else(|_| {
                        serde_json::json!({"result": message.content})
                    });
                    contents.push(Content {
                        role: "user".into(),
                        parts: vec![Part {
                            text: None,
                            function_call: None,
                            function_response: Some(FunctionResponse { name, response }),
                        }],
                    });
                }
            }
        }

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(vec![ApiTools {
                function_declarations: request
                    .tools
                    .iter()
                    .map(|t| FunctionDeclaration {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    })
                    .collect(),
            }])
        };

        ApiRequest {
            system_instruction: if system_text.is_empty() {
                None
            } else {
                Some(SystemInstruction {
                    parts: vec![Part::text(&system_text)],
                })
            },
            contents,
            tools,
        }
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn stream_turn(
        &self,
        request: TurnRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, LlmError>>, LlmError> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| LlmError::AuthFailed {
                provider: "gemini".to_string(),
            })?;

        let body = Self::to_api_request(&request);

        debug!(model = %self.config.model, "Sending Gemini streaming request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key.expose_secret())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: "gemini".to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(LlmError::AuthFailed {
                provider: "gemini".to_string(),
            });
        }
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(LlmError::RateLimited {
                provider: "gemini".to_string(),
                retry_after,
            });
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Gemini returned an error");
            return Err(LlmError::RequestFailed {
                provider: "gemini".to_string(),
                reason: format!("status {status}: {error_body}"),
            });
        }

        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut tool_calls: Vec<ToolCall> = Vec::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(LlmError::StreamInterrupted {
                                provider: "gemini".to_string(),
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

                    match serde_json::from_str::<StreamResponse>(data.trim()) {
                        Ok(parsed) => {
                            let parts = parsed
                                .candidates
                                .into_iter()
                                .next()
                                .and_then(|c| c.content)
                                .map(|c| c.parts)
                                .unwrap_or_default();
                            for part in parts {
                                if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                                    let chunk = StreamChunk {
                                        text: Some(text),
                                        ..Default::default()
                                    };
                                    if tx.send(Ok(chunk)).await.is_err() {
                                        return;
                                    }
                                }
                                if let Some(call) = part.function_call {
                                    // Gemini has no call ids; synthesize
                                    // them so results can refer back.
                                    tool_calls.push(ToolCall {
                                        id: format!("call_{}", uuid::Uuid::new_v4()),
                                        name: call.name,
                                        arguments: call.args.to_string(),
                                    });
                                }
                            }
                        }
                        Err(e) => {
                            trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
                        }
                    }
                }
            }

            // Gemini streams have no [DONE] sentinel; the connection
            // closing is the end of the turn.
            let _ = tx
                .send(Ok(StreamChunk {
                    text: None,
                    tool_calls,
                    done: true,
                }))
                .await;
        });

        Ok(rx)
    }
}

// --- Gemini API types (internal) ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTools>>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            function_call: None,
            function_response: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiTools {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}
