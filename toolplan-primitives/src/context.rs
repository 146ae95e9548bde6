//! Cancellable, time-bounded execution context handed to every tool call.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::TaskId;

/// Reason a [`CallContext`] stopped accepting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    /// The cancellation token was triggered.
    Cancelled,
    /// The deadline elapsed.
    DeadlineExceeded,
}

impl Interruption {
    /// Short label used in error messages and log fields.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline exceeded",
        }
    }
}

/// Execution context propagated through executor, planner, and tools.
///
/// Cloning is cheap and clones observe the same cancellation token. Use
/// [`CallContext::child`] to derive a context that can be cancelled on its own
/// without affecting the parent.
#[derive(Clone, Debug)]
pub struct CallContext {
    task_id: TaskId,
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CallContext {
    /// Creates an unbounded context for a fresh task.
    #[must_use]
    pub fn new() -> Self {
        Self {
            task_id: TaskId::random(),
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Uses an externally owned cancellation token.
    #[must_use]
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Bounds the context to `timeout` from now. An earlier existing deadline
    /// is kept.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Bounds the context to an absolute deadline. An earlier existing deadline
    /// is kept.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    /// Derives a child context sharing task id and deadline. Cancelling the
    /// parent cancels the child, not the other way round.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            task_id: self.task_id,
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Returns the configured deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the time left before the deadline, if one is set.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns the underlying cancellation token.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancels this context and every child derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns the interruption that already happened, if any.
    #[must_use]
    pub fn interruption(&self) -> Option<Interruption> {
        if self.token.is_cancelled() {
            return Some(Interruption::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Interruption::DeadlineExceeded),
            _ => None,
        }
    }

    /// Returns `true` once the context was cancelled or its deadline passed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.interruption().is_some()
    }

    /// Completes when the context is cancelled or the deadline elapses.
    pub async fn done(&self) -> Interruption {
        match self.deadline {
            Some(deadline) => tokio::select! {
                () = self.token.cancelled() => Interruption::Cancelled,
                () = tokio::time::sleep_until(deadline) => Interruption::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                Interruption::Cancelled
            }
        }
    }
}
