//! Cancellation and deadline for the bind step.

use std::io;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Bounds how long a listener may take to bind.
///
/// Only the bind itself observes the context. Cancelling after a listener is
/// bound has no effect on the listener or on serving.
#[derive(Debug, Clone, Default)]
pub struct ListenContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl ListenContext {
    /// A context that never expires.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// A context cancelled together with `token`.
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            cancel: token,
            deadline: None,
        }
    }

    /// Adds a deadline to an existing context, keeping the earlier one.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Resolves once the context is cancelled or expired, yielding the cause.
    pub async fn done(&self) -> io::Error {
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                io::Error::new(io::ErrorKind::Interrupted, "listen cancelled")
            }
            _ = expired => {
                io::Error::new(io::ErrorKind::TimedOut, "listen deadline exceeded")
            }
        }
    }
}
