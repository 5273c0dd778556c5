//! Test utilities for switchboard-core.
//!
//! Mock implementations for exercising the broker without a live model
//! provider. Enable with the `test-utils` feature:
//!
//! ```toml
//! [dev-dependencies]
//! switchboard-core = { version = "...", features = ["test-utils"] }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::events::{EventSink, ServerEvent};
use crate::transport::{
    MessageStream, ProviderTransport, QueryOptions, StreamMessage, TransportError,
};

/// A query as the mock transport received it.
#[derive(Debug, Clone)]
pub struct RecordedQuery {
    pub prompt: String,
    pub options: QueryOptions,
}

enum ScriptedTurn {
    /// Play these messages and end the stream.
    Messages(Vec<StreamMessage>),
    /// A stream that never yields, for cancellation tests.
    Pending,
    /// A stream driven by the test through a channel sender.
    Channel(mpsc::UnboundedReceiver<StreamMessage>),
}

/// A scripted provider transport.
///
/// Turns are played back in order; each [`query`](ProviderTransport::query)
/// pops the next scripted message sequence. An unscripted query completes
/// immediately with a generated thread id.
///
/// # Example
///
/// ```rust
/// use switchboard_core::test_utils::MockTransport;
///
/// let transport = MockTransport::new()
///     .with_text("Opening your notes")
///     .with_error("stream dropped");
/// ```
#[derive(Clone)]
pub struct MockTransport {
    name: String,
    turns: Arc<Mutex<VecDeque<ScriptedTurn>>>,
    queries: Arc<Mutex<Vec<RecordedQuery>>>,
    interrupts: Arc<AtomicUsize>,
    fail_next: Arc<Mutex<Option<TransportError>>>,
    turn_counter: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            turns: Arc::new(Mutex::new(VecDeque::new())),
            queries: Arc::new(Mutex::new(Vec::new())),
            interrupts: Arc::new(AtomicUsize::new(0)),
            fail_next: Arc::new(Mutex::new(None)),
            turn_counter: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::new()
        }
    }

    /// Script a full turn from raw stream messages.
    pub fn with_turn(self, messages: Vec<StreamMessage>) -> Self {
        self.push_turn(messages);
        self
    }

    /// Non-consuming form of [`with_turn`](Self::with_turn), for scripting
    /// after the transport has been handed out.
    pub fn push_turn(&self, messages: Vec<StreamMessage>) {
        self.turns.lock().push_back(ScriptedTurn::Messages(messages));
    }

    /// Script a turn that streams `text` and completes.
    pub fn with_text(self, text: impl Into<String>) -> Self {
        let thread = format!("thread-{}", self.turns.lock().len() + 1);
        let messages = vec![
            StreamMessage::Text {
                content: Some(text.into()),
                session_id: Some(thread.clone()),
            },
            StreamMessage::Complete { session_id: thread },
        ];
        self.with_turn(messages)
    }

    /// Script a turn that fails in-stream.
    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.with_turn(vec![StreamMessage::Error {
            message: message.into(),
            session_id: None,
        }])
    }

    /// Script a turn whose stream never yields, for cancellation tests.
    pub fn with_hanging_turn(self) -> Self {
        self.turns.lock().push_back(ScriptedTurn::Pending);
        self
    }

    /// Script a turn the test drives through the returned sender.
    ///
    /// The turn's stream yields whatever is sent and ends when the sender
    /// is dropped or a terminal message is consumed.
    pub fn push_streamed_turn(&self) -> mpsc::UnboundedSender<StreamMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.turns.lock().push_back(ScriptedTurn::Channel(rx));
        tx
    }

    /// Make the next `query` call itself fail.
    pub fn fail_next_query(self, error: TransportError) -> Self {
        *self.fail_next.lock() = Some(error);
        self
    }

    /// Every query received so far.
    pub fn queries(&self) -> Vec<RecordedQuery> {
        self.queries.lock().clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().len()
    }

    pub fn interrupt_count(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ProviderTransport for MockTransport {
    fn provider_name(&self) -> &str {
        &self.name
    }

    async fn query(
        &self,
        prompt: &str,
        options: QueryOptions,
    ) -> Result<MessageStream, TransportError> {
        self.queries.lock().push(RecordedQuery {
            prompt: prompt.to_string(),
            options,
        });
        if let Some(error) = self.fail_next.lock().take() {
            return Err(error);
        }

        let scripted = self.turns.lock().pop_front();
        match scripted {
            Some(ScriptedTurn::Messages(messages)) => {
                Ok(Box::pin(futures::stream::iter(messages)))
            }
            Some(ScriptedTurn::Pending) => Ok(Box::pin(futures::stream::pending())),
            Some(ScriptedTurn::Channel(rx)) => Ok(Box::pin(UnboundedReceiverStream::new(rx))),
            None => {
                let n = self.turn_counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(Box::pin(futures::stream::iter(vec![
                    StreamMessage::Complete {
                        session_id: format!("thread-auto-{}", n),
                    },
                ])))
            }
        }
    }

    fn interrupt(&self) {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
    }

    async fn dispose(&self) {}
}

/// Collects outbound server events for verification in tests.
///
/// # Example
///
/// ```rust
/// use switchboard_core::test_utils::EventRecorder;
///
/// let recorder = EventRecorder::new();
/// assert!(recorder.is_empty());
/// ```
#[derive(Clone)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<ServerEvent>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// All collected events, in arrival order.
    pub fn events(&self) -> Vec<ServerEvent> {
        self.events.lock().clone()
    }

    /// Collected event type names, in arrival order.
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(event_type_name).collect()
    }

    pub fn has_event(&self, event_type: &str) -> bool {
        self.events
            .lock()
            .iter()
            .any(|e| event_type_name(e) == event_type)
    }

    pub fn count_event(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| event_type_name(e) == event_type)
            .count()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventRecorder {
    fn send(&self, event: ServerEvent) {
        self.events.lock().push(event);
    }
}

fn event_type_name(event: &ServerEvent) -> &'static str {
    match event {
        ServerEvent::ConnectionStatus { .. } => "CONNECTION_STATUS",
        ServerEvent::Actions { .. } => "ACTIONS",
        ServerEvent::AgentThinking { .. } => "AGENT_THINKING",
        ServerEvent::AgentResponse { .. } => "AGENT_RESPONSE",
        ServerEvent::ToolProgress { .. } => "TOOL_PROGRESS",
        ServerEvent::WindowAgentStatus { .. } => "WINDOW_AGENT_STATUS",
        ServerEvent::ApprovalRequest { .. } => "APPROVAL_REQUEST",
        ServerEvent::Error { .. } => "ERROR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_mock_transport_plays_turns_in_order() {
        let transport = MockTransport::new()
            .with_text("first")
            .with_error("boom");

        let stream = transport
            .query("hello", QueryOptions::default())
            .await
            .unwrap();
        let messages: Vec<StreamMessage> = stream.collect().await;
        assert!(matches!(
            messages[0],
            StreamMessage::Text { ref content, .. } if content.as_deref() == Some("first")
        ));
        assert!(matches!(messages[1], StreamMessage::Complete { .. }));

        let stream = transport
            .query("again", QueryOptions::default())
            .await
            .unwrap();
        let messages: Vec<StreamMessage> = stream.collect().await;
        assert!(matches!(messages[0], StreamMessage::Error { .. }));

        assert_eq!(transport.query_count(), 2);
        assert_eq!(transport.queries()[0].prompt, "hello");
    }

    #[tokio::test]
    async fn test_mock_transport_raises_scripted_failure() {
        let transport =
            MockTransport::new().fail_next_query(TransportError::Unreachable("offline".into()));
        let result = transport.query("hi", QueryOptions::default()).await;
        assert!(matches!(result, Err(TransportError::Unreachable(_))));

        // Subsequent queries succeed again.
        assert!(transport.query("hi", QueryOptions::default()).await.is_ok());
    }

    #[test]
    fn test_event_recorder_counts() {
        let recorder = EventRecorder::new();
        recorder.send(ServerEvent::error("bad"));
        recorder.send(ServerEvent::AgentThinking {
            agent_id: "main".into(),
            content: "hmm".into(),
        });

        assert_eq!(recorder.len(), 2);
        assert!(recorder.has_event("ERROR"));
        assert_eq!(recorder.count_event("AGENT_THINKING"), 1);
        assert_eq!(recorder.event_types(), vec!["ERROR", "AGENT_THINKING"]);
    }
}
