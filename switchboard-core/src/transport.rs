//! Provider transport abstraction
//!
//! This module contains the `ProviderTransport` trait that adapts a
//! streaming model API into a uniform message iterator. Concrete provider
//! wire syntaxes live outside the core; agents consume the stream without
//! knowing which provider produced it.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::BoxStream;
use parking_lot::Mutex;
use serde_json::Value;

use crate::events::ImageAttachment;

/// Messages yielded by a streaming provider query.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// Incremental response text. Providers that learn the thread id
    /// mid-stream attach it here.
    Text {
        content: Option<String>,
        session_id: Option<String>,
    },
    /// Incremental extended thinking.
    Thinking { content: String },
    /// The model invoked a tool.
    ToolUse {
        name: String,
        id: Option<String>,
        input: Option<Value>,
    },
    /// A tool finished and returned a result to the model.
    ToolResult {
        name: String,
        id: Option<String>,
        content: Value,
    },
    /// The turn ended normally; carries the provider's thread id.
    Complete { session_id: String },
    /// The turn ended in a provider-side failure. Recoverable: the turn is
    /// over but the transport remains usable.
    Error {
        message: String,
        session_id: Option<String>,
    },
}

/// Options for one streaming query.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub system_prompt: Option<String>,
    pub model: Option<String>,
    /// Provider thread to continue, or to fork when `fork_session` is set.
    pub session_id: Option<String>,
    /// Start a distinct thread inheriting `session_id`'s context.
    pub fork_session: bool,
    /// Resume a persisted thread by its canonical name.
    pub resume_thread: Option<String>,
    pub images: Vec<ImageAttachment>,
    pub monitor_id: Option<String>,
    pub agent_id: Option<String>,
    /// Restrict the tool surface for this turn; `None` means unrestricted.
    pub allowed_tools: Option<Vec<String>>,
}

/// Error types for provider transports
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Credentials missing or rejected
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Provider endpoint unreachable
    #[error("provider unreachable: {0}")]
    Unreachable(String),

    /// The stream broke mid-turn
    #[error("stream failure: {0}")]
    Stream(String),

    /// `query` called after `dispose`
    #[error("transport disposed")]
    Disposed,
}

/// Boxed message stream returned by [`ProviderTransport::query`].
pub type MessageStream = BoxStream<'static, StreamMessage>;

/// Trait for streaming model providers
///
/// The surface is deliberately narrow: one streaming query plus lifecycle
/// control. Failures surface either as a [`StreamMessage::Error`] within
/// the sequence or as a raised [`TransportError`] from `query` itself;
/// cancellation must end the sequence cleanly without raising.
#[async_trait::async_trait]
pub trait ProviderTransport: Send + Sync {
    /// Provider identity for display and pool keying (e.g. "claude").
    fn provider_name(&self) -> &str;

    /// Start a streaming turn.
    async fn query(&self, prompt: &str, options: QueryOptions)
        -> Result<MessageStream, TransportError>;

    /// Cancel the in-flight query. Idempotent and safe from any task.
    fn interrupt(&self);

    /// Release transport-held resources. `query` must not be called after.
    async fn dispose(&self);

    /// Inject additional input into an active turn. Returns whether the
    /// provider accepted it.
    async fn steer(&self, _content: &str) -> bool {
        false
    }
}

/// Factory producing an authenticated transport for a provider identity.
pub type TransportFactory = Arc<dyn Fn(&str) -> Arc<dyn ProviderTransport> + Send + Sync>;

/// A small per-session pool of warm, pre-authenticated transports.
///
/// Checked-in transports are reused before the factory is asked for a new
/// one, keyed by provider identity.
pub struct TransportPool {
    factory: TransportFactory,
    warm: Mutex<HashMap<String, Vec<Arc<dyn ProviderTransport>>>>,
}

impl TransportPool {
    pub fn new(factory: TransportFactory) -> Self {
        Self {
            factory,
            warm: Mutex::new(HashMap::new()),
        }
    }

    /// Take a warm transport for `provider`, or build a fresh one.
    pub fn checkout(&self, provider: &str) -> Arc<dyn ProviderTransport> {
        if let Some(transport) = self
            .warm
            .lock()
            .get_mut(provider)
            .and_then(|pool| pool.pop())
        {
            return transport;
        }
        (self.factory)(provider)
    }

    /// Return a transport for later reuse.
    pub fn checkin(&self, transport: Arc<dyn ProviderTransport>) {
        let key = transport.provider_name().to_string();
        self.warm.lock().entry(key).or_default().push(transport);
    }

    /// Dispose every warm transport.
    pub async fn dispose_all(&self) {
        let drained: Vec<Arc<dyn ProviderTransport>> = {
            let mut warm = self.warm.lock();
            warm.drain().flat_map(|(_, pool)| pool).collect()
        };
        for transport in drained {
            transport.dispose().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubTransport {
        name: String,
    }

    #[async_trait::async_trait]
    impl ProviderTransport for StubTransport {
        fn provider_name(&self) -> &str {
            &self.name
        }

        async fn query(
            &self,
            _prompt: &str,
            _options: QueryOptions,
        ) -> Result<MessageStream, TransportError> {
            Ok(Box::pin(futures::stream::empty()))
        }

        fn interrupt(&self) {}

        async fn dispose(&self) {}
    }

    #[tokio::test]
    async fn test_pool_reuses_checked_in_transports() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let pool = TransportPool::new(Arc::new(move |provider: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(StubTransport {
                name: provider.to_string(),
            }) as Arc<dyn ProviderTransport>
        }));

        let first = pool.checkout("claude");
        assert_eq!(built.load(Ordering::SeqCst), 1);

        pool.checkin(first);
        let second = pool.checkout("claude");
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(second.provider_name(), "claude");

        // A different provider key builds fresh.
        let _other = pool.checkout("codex");
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }
}
