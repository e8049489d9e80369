//! Shutdown coordination for a serving engine.

use tokio::sync::watch;

/// Phase of a graceful shutdown. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownPhase {
    /// Serving normally.
    Running,
    /// No new connections; in-flight ones finish.
    Draining,
    /// Remaining connections are closed immediately.
    Forced,
}

/// Coordinator for graceful shutdown.
///
/// Backed by a watch channel so tasks that subscribe late still observe a
/// phase that was entered before they started.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<ShutdownPhase>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ShutdownPhase::Running);
        Self { tx }
    }

    /// Subscribe to phase changes.
    pub fn subscribe(&self) -> ShutdownReceiver {
        ShutdownReceiver {
            rx: self.tx.subscribe(),
        }
    }

    /// Stop accepting and let connections drain.
    pub fn drain(&self) {
        self.advance(ShutdownPhase::Draining);
    }

    /// Close whatever is still open.
    pub fn force(&self) {
        self.advance(ShutdownPhase::Forced);
    }

    pub fn phase(&self) -> ShutdownPhase {
        *self.tx.borrow()
    }

    fn advance(&self, to: ShutdownPhase) {
        self.tx.send_if_modified(|phase| {
            if *phase < to {
                *phase = to;
                true
            } else {
                false
            }
        });
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscriber side of [`Shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownReceiver {
    rx: watch::Receiver<ShutdownPhase>,
}

impl ShutdownReceiver {
    /// Resolves once draining (or forcing) has begun.
    pub async fn draining(&mut self) {
        self.reached(ShutdownPhase::Draining).await;
    }

    /// Resolves once remaining connections must be closed.
    pub async fn forced(&mut self) {
        self.reached(ShutdownPhase::Forced).await;
    }

    async fn reached(&mut self, phase: ShutdownPhase) {
        if self.rx.wait_for(|current| *current >= phase).await.is_err() {
            // Coordinator dropped: nothing will ever signal, treat as forced.
            tracing::debug!("Shutdown coordinator dropped");
        }
    }
}
