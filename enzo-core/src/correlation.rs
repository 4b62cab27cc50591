//! In-flight request tracking.
//!
//! Every outbound frame that expects an answer is registered here under
//! its correlation token. Entries leave the map exactly once: by a
//! matching reply, by their deadline, or by connection teardown.

use std::collections::HashMap;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::time::{DelayQueue, delay_queue};

use crate::context::Context;
use crate::error::EnzoError;

/// Completion callback for a request; called exactly once.
pub type Settle = Box<dyn FnOnce(Result<Context, EnzoError>) + Send + 'static>;

/// Why the driver sent a Ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Probe {
    /// First round trip on a fresh link.
    Handshake,
    /// Periodic or suspicion-driven liveness check.
    Liveness,
}

pub(crate) enum Waiter {
    Request(Settle),
    Probe(Probe),
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Waiter::Request(_) => f.write_str("Request(..)"),
            Waiter::Probe(probe) => f.debug_tuple("Probe").field(probe).finish(),
        }
    }
}

/// What happened to a token handed to `resolve` or `expire`.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Resolution {
    /// A request callback was invoked.
    Settled,
    /// An internal probe completed.
    Probe(Probe),
    /// No pending entry; the reply was late or duplicated.
    Unknown,
}

struct PendingRequest {
    waiter: Waiter,
    deadline: Option<delay_queue::Key>,
    sent_at: Instant,
}

// ── Correlator ───────────────────────────────────────────────────

pub(crate) struct Correlator {
    pending: HashMap<String, PendingRequest>,
    deadlines: DelayQueue<String>,
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            deadlines: DelayQueue::new(),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub fn contains(&self, token: &str) -> bool {
        self.pending.contains_key(token)
    }

    /// Returns `true` while at least one entry carries a deadline.
    #[cfg(test)]
    pub fn has_deadlines(&self) -> bool {
        !self.deadlines.is_empty()
    }

    /// Track `token`. A `None` timeout never expires.
    pub fn register(
        &mut self,
        token: String,
        timeout: Option<Duration>,
        waiter: Waiter,
    ) -> Result<(), (EnzoError, Waiter)> {
        if self.pending.contains_key(&token) {
            return Err((EnzoError::DuplicateMessageId(token), waiter));
        }
        let deadline = timeout.map(|t| self.deadlines.insert(token.clone(), t));
        self.pending.insert(
            token,
            PendingRequest {
                waiter,
                deadline,
                sent_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Settle `token` with `result`.
    pub fn resolve(&mut self, token: &str, result: Result<Context, EnzoError>) -> Resolution {
        let Some(request) = self.pending.remove(token) else {
            return Resolution::Unknown;
        };
        if let Some(key) = request.deadline {
            self.deadlines.remove(&key);
        }
        tracing::trace!(token, elapsed = ?request.sent_at.elapsed(), "request settled");
        settle(request.waiter, result)
    }

    /// Next token whose deadline has passed.
    pub fn poll_expired(&mut self, cx: &mut TaskContext<'_>) -> Poll<Option<String>> {
        self.deadlines
            .poll_expired(cx)
            .map(|expired| expired.map(|e| e.into_inner()))
    }

    /// Settle an expired token with a timeout error.
    pub fn expire(&mut self, token: &str) -> Resolution {
        let Some(request) = self.pending.remove(token) else {
            return Resolution::Unknown;
        };
        let elapsed = request.sent_at.elapsed();
        settle(request.waiter, Err(EnzoError::Timeout(elapsed)))
    }

    /// Settle every pending entry; used when the link goes away.
    pub fn fail_all(&mut self, error: impl Fn() -> EnzoError) -> usize {
        self.deadlines.clear();
        let drained: Vec<PendingRequest> = self.pending.drain().map(|(_, r)| r).collect();
        let count = drained.len();
        for request in drained {
            settle(request.waiter, Err(error()));
        }
        count
    }
}

fn settle(waiter: Waiter, result: Result<Context, EnzoError>) -> Resolution {
    match waiter {
        Waiter::Request(callback) => {
            callback(result);
            Resolution::Settled
        }
        Waiter::Probe(probe) => Resolution::Probe(probe),
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::poll_fn;
    use std::sync::{Arc, Mutex};

    use crate::client::Outbound;
    use crate::frame::Frame;

    type Outcomes = Arc<Mutex<Vec<Result<String, String>>>>;

    fn recorder(outcomes: &Outcomes) -> Waiter {
        let outcomes = outcomes.clone();
        Waiter::Request(Box::new(move |result| {
            let entry = result
                .map(|ctx| ctx.text().unwrap())
                .map_err(|e| e.to_string());
            outcomes.lock().unwrap().push(entry);
        }))
    }

    fn reply(data: &'static str) -> Context {
        let (outbound, _rx) = Outbound::detached();
        Context::reply(Frame::back(Default::default(), "k", data), outbound)
    }

    #[tokio::test]
    async fn resolve_invokes_callback_once() {
        let outcomes = Outcomes::default();
        let mut correlator = Correlator::new();
        correlator
            .register("abc".into(), Some(Duration::from_secs(6)), recorder(&outcomes))
            .unwrap();

        assert_eq!(correlator.resolve("abc", Ok(reply("hi"))), Resolution::Settled);
        assert_eq!(correlator.resolve("abc", Ok(reply("again"))), Resolution::Unknown);
        assert_eq!(*outcomes.lock().unwrap(), vec![Ok("hi".to_string())]);
        assert_eq!(correlator.len(), 0);
        assert!(!correlator.has_deadlines());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expires_then_late_reply_is_ignored() {
        let outcomes = Outcomes::default();
        let mut correlator = Correlator::new();
        correlator
            .register("slow".into(), Some(Duration::from_millis(6000)), recorder(&outcomes))
            .unwrap();

        let token = poll_fn(|cx| correlator.poll_expired(cx)).await.unwrap();
        assert_eq!(token, "slow");
        assert_eq!(correlator.expire(&token), Resolution::Settled);
        assert_eq!(correlator.resolve("slow", Ok(reply("late"))), Resolution::Unknown);

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].as_ref().unwrap_err().contains("timeout"));
    }

    #[tokio::test]
    async fn long_running_has_no_deadline() {
        let outcomes = Outcomes::default();
        let mut correlator = Correlator::new();
        correlator
            .register("long".into(), None, recorder(&outcomes))
            .unwrap();
        assert!(correlator.contains("long"));
        assert!(!correlator.has_deadlines());
    }

    #[tokio::test]
    async fn duplicate_token_is_refused() {
        let outcomes = Outcomes::default();
        let mut correlator = Correlator::new();
        correlator
            .register("dup".into(), None, recorder(&outcomes))
            .unwrap();
        let refused = correlator.register("dup".into(), None, recorder(&outcomes));
        assert!(matches!(
            refused,
            Err((EnzoError::DuplicateMessageId(_), Waiter::Request(_)))
        ));
    }

    #[tokio::test]
    async fn probes_are_reported_not_called() {
        let mut correlator = Correlator::new();
        correlator
            .register("p".into(), Some(Duration::from_secs(5)), Waiter::Probe(Probe::Handshake))
            .unwrap();
        assert_eq!(
            correlator.resolve("p", Ok(reply(""))),
            Resolution::Probe(Probe::Handshake)
        );
    }

    #[tokio::test]
    async fn fail_all_settles_everything() {
        let outcomes = Outcomes::default();
        let mut correlator = Correlator::new();
        correlator
            .register("a".into(), Some(Duration::from_secs(6)), recorder(&outcomes))
            .unwrap();
        correlator
            .register("b".into(), None, recorder(&outcomes))
            .unwrap();

        assert_eq!(correlator.fail_all(|| EnzoError::ConnectionLost), 2);
        assert_eq!(correlator.len(), 0);
        assert!(!correlator.has_deadlines());
        let outcomes = outcomes.lock().unwrap();
        assert!(outcomes.iter().all(|o| o.as_ref().unwrap_err() == "connection lost"));
    }
}
