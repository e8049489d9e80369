//! OS interrupt fan-in.
//!
//! # Responsibilities
//! - Forward SIGINT (Ctrl+C) into a process-wide broadcast channel
//! - Let any number of tasks wait for the next interrupt
//!
//! # Design Decisions
//! - The OS handler is installed lazily, on first subscription
//! - The forwarder runs on its own thread and runtime, so it outlives
//!   whichever runtime asked for it
//! - Single-slot channel: a burst of interrupts collapses into one event

use std::io;
use std::sync::{mpsc, Mutex, OnceLock, PoisonError};

use tokio::sync::broadcast;

/// An externally generated interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupt;

impl std::fmt::Display for Interrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("interrupt")
    }
}

/// Broadcaster of interrupt notifications.
#[derive(Debug)]
pub struct Interrupts {
    tx: broadcast::Sender<Interrupt>,
    /// Set once a forwarder is registered with the OS.
    os_handler: Mutex<bool>,
}

impl Interrupts {
    /// A broadcaster with no OS handler attached.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            os_handler: Mutex::new(false),
        }
    }

    /// Subscribe to interrupts delivered after this call.
    pub fn subscribe(&self) -> InterruptReceiver {
        InterruptReceiver {
            rx: self.tx.subscribe(),
        }
    }

    /// Deliver an interrupt to every current subscriber.
    ///
    /// Returns the number of subscribers notified.
    pub fn notify(&self) -> usize {
        self.tx.send(Interrupt).unwrap_or(0)
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Whether the OS handler is forwarding interrupts.
    pub fn is_attached(&self) -> bool {
        *self.os_handler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach the OS handler unless already attached.
    ///
    /// Returns once the handler is registered, so an interrupt sent after
    /// this call is never lost. A failed attempt is retried on the next call.
    fn install_os_handler(&'static self) {
        let mut attached = self.os_handler.lock().unwrap_or_else(PoisonError::into_inner);
        if *attached {
            return;
        }

        match self.spawn_forwarder() {
            Ok(()) => *attached = true,
            Err(e) => tracing::warn!(error = %e, "Interrupt handler not installed"),
        }
    }

    fn spawn_forwarder(&'static self) -> io::Result<()> {
        let (ready_tx, ready_rx) = mpsc::channel();

        std::thread::Builder::new()
            .name("gracehttp-interrupts".to_string())
            .spawn(move || self.forward(ready_tx))?;

        ready_rx
            .recv()
            .map_err(|_| io::Error::other("interrupt forwarder exited during startup"))?
    }

    fn forward(&'static self, ready: mpsc::Sender<io::Result<()>>) {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };

        runtime.block_on(async move {
            let mut signals = match os_interrupts() {
                Ok(signals) => signals,
                Err(e) => {
                    let _ = ready.send(Err(e));
                    return;
                }
            };
            let _ = ready.send(Ok(()));

            while signals.recv().await.is_some() {
                let receivers = self.notify();
                tracing::info!(receivers, "Interrupt received");
            }
            tracing::error!("Interrupt stream closed");
        });
    }
}

#[cfg(unix)]
fn os_interrupts() -> io::Result<tokio::signal::unix::Signal> {
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
}

#[cfg(windows)]
fn os_interrupts() -> io::Result<tokio::signal::windows::CtrlC> {
    tokio::signal::windows::ctrl_c()
}

impl Default for Interrupts {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of [`Interrupts`].
#[derive(Debug)]
pub struct InterruptReceiver {
    rx: broadcast::Receiver<Interrupt>,
}

impl InterruptReceiver {
    /// Wait for the next interrupt.
    ///
    /// Returns `None` once the broadcaster is gone.
    pub async fn recv(&mut self) -> Option<Interrupt> {
        match self.rx.recv().await {
            Ok(interrupt) => Some(interrupt),
            // Missed events still mean at least one interrupt arrived.
            Err(broadcast::error::RecvError::Lagged(_)) => Some(Interrupt),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

static INTERRUPTS: OnceLock<Interrupts> = OnceLock::new();

/// The process-wide broadcaster, wired to Ctrl+C on first use.
pub fn interrupts() -> &'static Interrupts {
    let interrupts = INTERRUPTS.get_or_init(Interrupts::new);
    interrupts.install_os_handler();
    interrupts
}

/// Block until the process receives an interrupt.
pub async fn wait_for_interrupt() -> Interrupt {
    let mut rx = interrupts().subscribe();
    // The global sender is never dropped.
    rx.recv().await.unwrap_or(Interrupt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn notify_reaches_every_subscriber() {
        let interrupts = Interrupts::new();
        let mut a = interrupts.subscribe();
        let mut b = interrupts.subscribe();

        assert_eq!(interrupts.notify(), 2);
        assert_eq!(a.recv().await, Some(Interrupt));
        assert_eq!(b.recv().await, Some(Interrupt));
    }

    #[tokio::test]
    async fn one_event_per_interrupt() {
        let interrupts = Interrupts::new();
        let mut rx = interrupts.subscribe();

        interrupts.notify();
        assert_eq!(rx.recv().await, Some(Interrupt));

        let next = tokio::time::timeout(Duration::from_millis(20), rx.recv()).await;
        assert!(next.is_err(), "no second event without a second interrupt");
    }

    #[tokio::test]
    async fn burst_collapses_into_single_slot() {
        let interrupts = Interrupts::new();
        let mut rx = interrupts.subscribe();

        interrupts.notify();
        interrupts.notify();
        interrupts.notify();

        assert_eq!(rx.recv().await, Some(Interrupt));
    }

    #[test]
    fn notify_without_subscribers() {
        assert_eq!(Interrupts::new().notify(), 0);
    }

    #[tokio::test]
    async fn wait_for_interrupt_wakes_on_global_notify() {
        let waiter = tokio::spawn(wait_for_interrupt());

        // Subscription happens inside the spawned task.
        while interrupts().receiver_count() == 0 {
            tokio::task::yield_now().await;
        }
        interrupts().notify();

        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert_eq!(got, Interrupt);
    }

    #[test]
    fn handler_attaches_outside_a_runtime() {
        assert!(interrupts().is_attached());
    }

    #[cfg(unix)]
    #[test]
    fn sigint_delivered_after_first_runtime_is_dropped() {
        let first = tokio::runtime::Runtime::new().unwrap();
        first.block_on(async {
            interrupts();
        });
        drop(first);

        let second = tokio::runtime::Runtime::new().unwrap();
        second.block_on(async {
            let mut rx = interrupts().subscribe();

            let status = std::process::Command::new("kill")
                .args(["-INT", &std::process::id().to_string()])
                .status()
                .unwrap();
            assert!(status.success());

            let got = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("SIGINT should reach subscribers");
            assert_eq!(got, Some(Interrupt));
        });
    }
}
