//! Conversation orchestration.
//!
//! One user request drives a loop of model turns: stream text out as it
//! arrives, execute any requested tool calls one at a time in order, feed
//! the results back, and let the model continue until it answers without
//! calling tools. Tool failures are reported to the model, never thrown;
//! a turn only dies on provider failure or a stalled stream.

mod prompt;

pub use prompt::build_system_prompt;

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::catalog::ProtocolCatalog;
use crate::config::ChatConfig;
use crate::db::Database;
use crate::llm::{ChatMessage, LlmProvider, StreamChunk, ToolCall, TurnRequest};
use crate::tools::{ToolRegistry, ToolResult};

/// An event emitted to the client during a conversation turn.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChatEvent {
    /// A fragment of assistant text.
    Text(String),
    /// A tool is about to run.
    ToolCall {
        name: String,
        args: serde_json::Value,
    },
    /// A tool finished.
    ToolResult(ToolResult),
    /// The turn failed; no further events except `Done` will follow.
    Error(String),
    /// End of turn. Serialized on the wire as the `[DONE]` sentinel, not
    /// as JSON.
    Done,
}

/// Runs conversation turns against the schedule.
pub struct ChatOrchestrator {
    db: Arc<dyn Database>,
    catalog: Arc<dyn ProtocolCatalog>,
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    config: ChatConfig,
}

impl ChatOrchestrator {
    pub fn new(
        db: Arc<dyn Database>,
        catalog: Arc<dyn ProtocolCatalog>,
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        config: ChatConfig,
    ) -> Self {
        Self {
            db,
            catalog,
            provider,
            tools,
            config,
        }
    }

    /// Run one conversation turn.
    ///
    /// `history` is the client's transcript (user and assistant messages);
    /// the system prompt is rebuilt fresh from live data. Events stream
    /// over the returned channel, always ending with `ChatEvent::Done`.
    pub fn run(&self, history: Vec<ChatMessage>, today: NaiveDate) -> mpsc::Receiver<ChatEvent> {
        let (tx, rx) = mpsc::channel(64);
        let db = self.db.clone();
        let catalog = self.catalog.clone();
        let provider = self.provider.clone();
        let tools = self.tools.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            run_turn(db, catalog, provider, tools, config, history, today, &tx).await;
            let _ = tx.send(ChatEvent::Done).await;
        });

        rx
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_turn(
    db: Arc<dyn Database>,
    catalog: Arc<dyn ProtocolCatalog>,
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    config: ChatConfig,
    history: Vec<ChatMessage>,
    today: NaiveDate,
    tx: &mpsc::Sender<ChatEvent>,
) {
    let system = match build_system_prompt(db.as_ref(), catalog.as_ref(), today).await {
        Ok(system) => system,
        Err(e) => {
            error!(error = %e, "Failed to build system prompt");
            let _ = tx
                .send(ChatEvent::Error("Failed to load schedule data".to_string()))
                .await;
            return;
        }
    };

    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::system(system));
    messages.extend(history);

    let definitions = tools.definitions();

    for round in 0..=config.max_tool_rounds {
        let request = TurnRequest {
            messages: messages.clone(),
            tools: definitions.clone(),
        };

        let mut stream = match provider.stream_turn(request).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(provider = provider.name(), error = %e, "Provider request failed");
                let _ = tx.send(ChatEvent::Error(e.to_string())).await;
                return;
            }
        };

        let mut text = String::new();
        let mut calls: Vec<ToolCall> = Vec::new();

        loop {
            let next = tokio::time::timeout(config.turn_timeout, stream.recv()).await;
            match next {
                Err(_) => {
                    warn!(provider = provider.name(), "Provider stream stalled");
                    let _ = tx
                        .send(ChatEvent::Error("The model stopped responding".to_string()))
                        .await;
                    return;
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    error!(provider = provider.name(), error = %e, "Provider stream error");
                    let _ = tx.send(ChatEvent::Error(e.to_string())).await;
                    return;
                }
                Ok(Some(Ok(chunk))) => {
                    let StreamChunk {
                        text: delta,
                        tool_calls,
                        done,
                    } = chunk;
                    if let Some(delta) = delta {
                        text.push_str(&delta);
                        if tx.send(ChatEvent::Text(delta)).await.is_err() {
                            return; // client went away
                        }
                    }
                    if done {
                        calls = tool_calls;
                        break;
                    }
                }
            }
        }

        if calls.is_empty() {
            debug!(rounds = round, "Turn complete");
            return;
        }

        if round == config.max_tool_rounds {
            warn!(limit = config.max_tool_rounds, "Tool round limit reached");
            let _ = tx
                .send(ChatEvent::Error(
                    "Too many tool calls in one turn; stopping here".to_string(),
                ))
                .await;
            return;
        }

        messages.push(ChatMessage::assistant_with_tools(text, calls.clone()));

        // Tools run serially, in the order the model issued them, so each
        // call sees the writes of the one before it.
        for call in &calls {
            let args: serde_json::Value = match serde_json::from_str(&call.arguments) {
                Ok(args) => args,
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Unparseable tool arguments");
                    serde_json::Value::Null
                }
            };
            if tx
                .send(ChatEvent::ToolCall {
                    name: call.name.clone(),
                    args: args.clone(),
                })
                .await
                .is_err()
            {
                return;
            }

            let result = if args.is_null() {
                ToolResult::fail(
                    "Tool arguments were not valid JSON".to_string(),
                    "invalid_params",
                )
            } else {
                tools.execute(&call.name, args).await
            };
            info!(tool = %call.name, success = result.success, "Tool executed");

            let payload = serde_json::to_string(&result)
                .unwrap_or_else(|_| r#"{"success":false,"message":"serialization failed"}"#.into());
            messages.push(ChatMessage::tool_result(call, payload));

            if tx.send(ChatEvent::ToolResult(result)).await.is_err() {
                return;
            }
        }
    }
}
