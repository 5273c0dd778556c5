//! Process-wide agent limiter
//!
//! A counted semaphore bounding the number of concurrently live agent
//! instances. Waiters queue FIFO; a released slot is handed directly to the
//! head waiter under the limiter lock, so a concurrent [`try_acquire`]
//! cannot steal it.
//!
//! [`try_acquire`]: AgentLimiter::try_acquire

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Default capacity when `MAX_AGENTS` is unset.
pub const DEFAULT_AGENT_LIMIT: usize = 10;

/// Why an acquisition did not produce a slot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquireError {
    /// Non-waiting acquisition on a full limiter.
    #[error("agent limit reached")]
    Exhausted,

    /// The caller-supplied timeout elapsed while queued.
    #[error("timed out waiting for an agent slot")]
    TimedOut,

    /// The queue was cleared, typically at shutdown.
    #[error("limiter shut down: {0}")]
    Shutdown(String),
}

/// Counter snapshot returned by [`AgentLimiter::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterStats {
    pub limit: usize,
    pub current: usize,
    pub waiting: usize,
}

enum WaiterGrant {
    Granted,
    Rejected(String),
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<WaiterGrant>,
}

struct Inner {
    limit: usize,
    current: usize,
    next_waiter_id: u64,
    waiters: VecDeque<Waiter>,
}

/// Counted semaphore with FIFO waiters and fair handoff on release.
///
/// All agent constructors route through one shared instance, so
/// `count(main) + count(task) + count(window)` never exceeds the limit
/// process-wide. Tests construct fresh instances instead of resetting
/// shared state.
pub struct AgentLimiter {
    inner: Mutex<Inner>,
}

impl AgentLimiter {
    /// Create a limiter with the given capacity.
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                limit,
                current: 0,
                next_waiter_id: 0,
                waiters: VecDeque::new(),
            }),
        })
    }

    /// Non-blocking acquisition.
    ///
    /// Refuses whenever waiters are queued, even if a count is technically
    /// free, preserving FIFO fairness.
    pub fn try_acquire(self: &Arc<Self>) -> Option<SlotPermit> {
        let mut inner = self.inner.lock();
        if inner.waiters.is_empty() && inner.current < inner.limit {
            inner.current += 1;
            Some(SlotPermit::new(self.clone()))
        } else {
            None
        }
    }

    /// Acquire a slot, queueing FIFO on exhaustion.
    ///
    /// With `timeout = None` this waits indefinitely. A `timeout` of zero on
    /// a full limiter rejects without queueing. A timed-out waiter is
    /// removed from the queue; if its grant raced the timeout, the slot is
    /// kept and the acquisition succeeds.
    pub async fn acquire(
        self: &Arc<Self>,
        timeout: Option<Duration>,
    ) -> Result<SlotPermit, AcquireError> {
        let (waiter_id, mut rx) = {
            let mut inner = self.inner.lock();
            if inner.waiters.is_empty() && inner.current < inner.limit {
                inner.current += 1;
                return Ok(SlotPermit::new(self.clone()));
            }
            if timeout == Some(Duration::ZERO) {
                return Err(AcquireError::TimedOut);
            }
            let id = inner.next_waiter_id;
            inner.next_waiter_id += 1;
            let (tx, rx) = oneshot::channel();
            inner.waiters.push_back(Waiter { id, tx });
            (id, rx)
        };

        let grant = match timeout {
            None => rx.await.ok(),
            Some(duration) => {
                tokio::select! {
                    grant = &mut rx => grant.ok(),
                    _ = tokio::time::sleep(duration) => {
                        return self.resolve_timeout(waiter_id, rx);
                    }
                }
            }
        };

        match grant {
            Some(WaiterGrant::Granted) => Ok(SlotPermit::new(self.clone())),
            Some(WaiterGrant::Rejected(reason)) => Err(AcquireError::Shutdown(reason)),
            // Sender dropped without a grant: the limiter itself went away.
            None => Err(AcquireError::Shutdown("limiter dropped".to_string())),
        }
    }

    /// Reject every queued waiter. Called at shutdown.
    pub fn clear_waiters(&self, reason: &str) {
        let mut inner = self.inner.lock();
        while let Some(waiter) = inner.waiters.pop_front() {
            let _ = waiter.tx.send(WaiterGrant::Rejected(reason.to_string()));
        }
    }

    /// Snapshot of `{limit, current, waiting}`.
    pub fn stats(&self) -> LimiterStats {
        let inner = self.inner.lock();
        LimiterStats {
            limit: inner.limit,
            current: inner.current,
            waiting: inner.waiters.len(),
        }
    }

    fn resolve_timeout(
        self: &Arc<Self>,
        waiter_id: u64,
        mut rx: oneshot::Receiver<WaiterGrant>,
    ) -> Result<SlotPermit, AcquireError> {
        {
            let mut inner = self.inner.lock();
            if let Some(pos) = inner.waiters.iter().position(|w| w.id == waiter_id) {
                inner.waiters.remove(pos);
                return Err(AcquireError::TimedOut);
            }
        }
        // No longer queued: a grant or rejection was already sent under the
        // limiter lock, so it must be readable now.
        match rx.try_recv() {
            Ok(WaiterGrant::Granted) => Ok(SlotPermit::new(self.clone())),
            Ok(WaiterGrant::Rejected(reason)) => Err(AcquireError::Shutdown(reason)),
            Err(_) => Err(AcquireError::TimedOut),
        }
    }

    // Fair release: the freed slot transfers to the head waiter without the
    // count ever dipping, closing the steal window.
    fn release_slot(&self) {
        let mut inner = self.inner.lock();
        while let Some(waiter) = inner.waiters.pop_front() {
            if waiter.tx.send(WaiterGrant::Granted).is_ok() {
                return;
            }
            // Receiver dropped (timed out or cancelled); try the next one.
        }
        inner.current = inner.current.saturating_sub(1);
    }
}

/// A held agent slot. Releasing is idempotent; dropping releases.
pub struct SlotPermit {
    limiter: Arc<AgentLimiter>,
    released: bool,
}

impl SlotPermit {
    fn new(limiter: Arc<AgentLimiter>) -> Self {
        Self {
            limiter,
            released: false,
        }
    }

    /// Return the slot, promoting the head waiter if one is queued.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.limiter.release_slot();
        }
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl std::fmt::Debug for SlotPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotPermit")
            .field("released", &self.released)
            .finish()
    }
}
