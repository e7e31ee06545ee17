//! Process-wide shutdown signal.
//!
//! The listener supervisor and the HTTP server each hold a receiver; the
//! first SIGINT/SIGTERM (or a programmatic trigger) notifies all of them.
//! The triggered flag is latched, so [`ShutdownController::wait`] also
//! resolves when shutdown happened before it was first polled.

use std::sync::Arc;

use tokio::signal;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

#[derive(Clone)]
pub struct ShutdownController {
    tx: broadcast::Sender<()>,
    triggered: Arc<watch::Sender<bool>>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        let (triggered, _) = watch::channel(false);
        Self {
            tx,
            triggered: Arc::new(triggered),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn shutdown(&self) {
        self.triggered.send_replace(true);
        let _ = self.tx.send(());
    }

    pub fn is_triggered(&self) -> bool {
        *self.triggered.borrow()
    }

    /// Resolves once shutdown has been triggered, including earlier triggers.
    pub async fn wait(&self) {
        let mut rx = self.triggered.subscribe();
        let _ = rx.wait_for(|triggered| *triggered).await;
    }

    /// Block until SIGINT or SIGTERM arrives, then trigger shutdown.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(err) = signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, shutting down"),
            _ = terminate => info!("received SIGTERM, shutting down"),
        }

        self.shutdown();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn every_subscriber_hears_shutdown() {
        let controller = ShutdownController::new();
        let mut listener = controller.subscribe();
        let mut server = controller.subscribe();

        controller.shutdown();

        assert!(listener.recv().await.is_ok());
        assert!(server.recv().await.is_ok());
    }

    #[tokio::test]
    async fn wait_resolves_after_trigger() {
        let controller = ShutdownController::new();
        let waiter = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.wait().await })
        };
        tokio::task::yield_now().await;

        controller.shutdown();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn wait_after_an_earlier_trigger_returns_immediately() {
        let controller = ShutdownController::new();
        controller.shutdown();
        assert!(controller.is_triggered());

        assert!(timeout(Duration::from_millis(200), controller.wait()).await.is_ok());
        let clone = controller.clone();
        assert!(timeout(Duration::from_millis(200), clone.wait()).await.is_ok());
    }
}
