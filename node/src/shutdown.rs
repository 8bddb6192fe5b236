//! Stop signal shared by the listener, the delivery workers and the periodic
//! tasks of one node.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

/// Fans a single stop signal out to every background task.
///
/// Each task holds a receiver from [`subscribe`](Self::subscribe) and selects
/// on it next to its own work. Cloning shares the same signal.
#[derive(Clone)]
pub struct ShutdownController {
    tx: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signal every subscriber. Later calls are no-ops.
    pub fn shutdown(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(());
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Resolve on SIGINT or SIGTERM. The signal is not forwarded to the
    /// tasks here; the node still has to say goodbye first.
    pub async fn wait_for_signal(&self) {
        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "SIGTERM handler unavailable");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = signal::ctrl_c() => tracing::info!(signal = "SIGINT", "stop requested"),
            _ = terminate => tracing::info!(signal = "SIGTERM", "stop requested"),
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_clone_sees_the_signal() {
        let controller = ShutdownController::new();
        let mut first = controller.subscribe();
        let mut second = controller.clone().subscribe();
        controller.shutdown();
        assert!(first.recv().await.is_ok());
        assert!(second.recv().await.is_ok());
        assert!(controller.clone().is_triggered());
    }

    #[tokio::test]
    async fn repeated_shutdown_sends_once() {
        let controller = ShutdownController::new();
        let mut rx = controller.subscribe();
        controller.shutdown();
        controller.shutdown();
        assert!(rx.recv().await.is_ok());
        assert!(rx.try_recv().is_err());
    }
}
