//! Turn execution for an agent session
//!
//! One turn runs `idle → acquiring → running → streaming → finalizing`:
//! obtain a limiter slot, install the tool-action bridge, stream the
//! provider's messages into outbound events, then unwind in every case.

use futures::StreamExt;
use serde_json::json;

use crate::events::{ServerEvent, ToolStatus};
use crate::limiter::AcquireError;
use crate::transcript::TranscriptKind;
use crate::transport::{QueryOptions, StreamMessage};

use super::bridge::TurnBridge;
use super::types::{AgentError, SlotPolicy, TurnOptions, TurnOutcome, TurnStatus};
use super::AgentSession;

impl AgentSession {
    /// Run one turn end to end.
    ///
    /// Acquires a limiter slot when the instance does not already hold one
    /// (per `options.slot_policy`), bridges emitter actions to outbound
    /// events for the duration, and streams the provider's reply. On every
    /// exit path the bridge is removed and a slot acquired by this turn is
    /// released.
    ///
    /// Transport failures end the turn with a [`TurnStatus::Failed`]
    /// outcome and an `ERROR` event; only capacity refusals (the turn never
    /// ran) surface as `Err`.
    pub async fn handle_message(
        &self,
        prompt: &str,
        options: TurnOptions,
    ) -> Result<TurnOutcome, AgentError> {
        self.set_role(&options.role);
        let role = options.role.clone();

        let mut acquired_this_turn = false;
        if !self.holds_slot() {
            let permit = match options.slot_policy {
                SlotPolicy::FailFast => self
                    .limiter
                    .try_acquire()
                    .ok_or(AgentError::Capacity(AcquireError::Exhausted))?,
                SlotPolicy::Wait => self.limiter.acquire(None).await?,
                SlotPolicy::WaitFor(timeout) => self.limiter.acquire(Some(timeout)).await?,
            };
            self.store_slot(permit);
            acquired_this_turn = true;
        }

        let cancel = self.fresh_cancel();
        let bridge = TurnBridge::install(
            self.emitter.clone(),
            self.id().to_string(),
            options.monitor_id.clone().or_else(|| {
                self.monitor_id().map(str::to_string)
            }),
            role.clone(),
            self.sink.clone(),
            self.transcript.clone(),
        );
        self.transcript
            .append(&role, TranscriptKind::Prompt, json!(prompt));

        let query_options = QueryOptions {
            system_prompt: options.system_prompt_override.clone(),
            model: None,
            session_id: if options.fork_session {
                options.parent_session_id.clone()
            } else {
                self.provider_session_id()
            },
            fork_session: options.fork_session,
            resume_thread: None,
            images: options.images.clone(),
            monitor_id: options.monitor_id.clone(),
            agent_id: Some(self.id().to_string()),
            allowed_tools: options.allowed_tools.clone(),
        };

        let outcome = match self.transport.query(prompt, query_options).await {
            Ok(stream) => self.consume_stream(stream, &role, cancel).await,
            Err(error) => {
                let message = error.to_string();
                self.sink.send(ServerEvent::error(message.clone()));
                self.transcript
                    .append(&role, TranscriptKind::Error, json!(message));
                (TurnStatus::Failed, String::new(), Some(message))
            }
        };
        let (status, response, error) = outcome;

        let actions = bridge.actions();
        drop(bridge);

        if status == TurnStatus::Completed && !response.is_empty() {
            self.transcript
                .append(&role, TranscriptKind::Response, json!(response));
        }
        if acquired_this_turn {
            if let Some(permit) = self.take_slot() {
                permit.release();
            }
        }

        Ok(TurnOutcome {
            status,
            response,
            actions,
            error,
            provider_session_id: self.provider_session_id(),
        })
    }

    async fn consume_stream(
        &self,
        mut stream: crate::transport::MessageStream,
        role: &str,
        cancel: tokio_util::sync::CancellationToken,
    ) -> (TurnStatus, String, Option<String>) {
        let mut response = String::new();

        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => {
                    self.transport.interrupt();
                    return (TurnStatus::Interrupted, response, None);
                }
                message = stream.next() => message,
            };

            let Some(message) = message else {
                // Stream ended without an explicit terminal frame.
                break;
            };

            match message {
                StreamMessage::Text {
                    content,
                    session_id,
                } => {
                    if let Some(thread_id) = session_id.as_deref() {
                        self.set_provider_session_id(thread_id);
                    }
                    if let Some(delta) = content {
                        response.push_str(&delta);
                        self.sink.send(ServerEvent::AgentResponse {
                            agent_id: role.to_string(),
                            content: delta,
                            is_complete: false,
                        });
                    }
                }
                StreamMessage::Thinking { content } => {
                    self.sink.send(ServerEvent::AgentThinking {
                        agent_id: role.to_string(),
                        content,
                    });
                }
                StreamMessage::ToolUse { name, id, input } => {
                    self.transcript.append(
                        role,
                        TranscriptKind::Tool,
                        json!({"tool": name, "id": id, "input": input}),
                    );
                    self.sink.send(ServerEvent::ToolProgress {
                        agent_id: role.to_string(),
                        tool_name: name,
                        status: ToolStatus::Running,
                    });
                }
                StreamMessage::ToolResult { name, .. } => {
                    self.sink.send(ServerEvent::ToolProgress {
                        agent_id: role.to_string(),
                        tool_name: name,
                        status: ToolStatus::Complete,
                    });
                }
                StreamMessage::Complete { session_id } => {
                    self.set_provider_session_id(&session_id);
                    self.sink.send(ServerEvent::AgentResponse {
                        agent_id: role.to_string(),
                        content: String::new(),
                        is_complete: true,
                    });
                    return (TurnStatus::Completed, response, None);
                }
                StreamMessage::Error {
                    message,
                    session_id,
                } => {
                    if let Some(thread_id) = session_id.as_deref() {
                        self.set_provider_session_id(thread_id);
                    }
                    self.sink.send(ServerEvent::error(message.clone()));
                    self.transcript
                        .append(role, TranscriptKind::Error, json!(message));
                    return (TurnStatus::Failed, response, Some(message));
                }
            }
        }

        self.sink.send(ServerEvent::AgentResponse {
            agent_id: role.to_string(),
            content: String::new(),
            is_complete: true,
        });
        (TurnStatus::Completed, response, None)
    }
}
