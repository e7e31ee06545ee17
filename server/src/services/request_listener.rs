//! Listener for `OracleRequest` events.
//!
//! Each delivered request starts its own consensus round. Events are handed
//! over in ledger order with no deduplication. A subscription starts at the
//! ledger head, so a request raised while the listener is down is missed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::consensus::ConsensusEngine;
use crate::error::ListenerError;
use crate::ledger::{Ledger, RequestSubscription};

const LISTENER_MAX_BACKOFF_SECONDS: u64 = 30;

/// Delay before restart number `restart_count`.
pub fn restart_backoff(restart_count: u32) -> Duration {
    let seconds = 2u64
        .saturating_pow(restart_count.min(5))
        .min(LISTENER_MAX_BACKOFF_SECONDS);
    Duration::from_secs(seconds)
}

#[derive(Clone)]
pub struct RequestListener {
    ledger: Arc<dyn Ledger>,
    engine: Arc<ConsensusEngine>,
}

impl RequestListener {
    pub fn new(ledger: Arc<dyn Ledger>, engine: Arc<ConsensusEngine>) -> Self {
        Self { ledger, engine }
    }

    /// Subscribe once and dispatch until the stream ends or shutdown.
    pub async fn run(&self, shutdown: &mut broadcast::Receiver<()>) -> Result<(), ListenerError> {
        let subscription = self
            .ledger
            .subscribe_oracle_requests()
            .await
            .map_err(ListenerError::Subscribe)?;
        info!("listening for oracle requests");

        tokio::select! {
            result = self.drain(subscription) => result,
            _ = shutdown.recv() => {
                info!("oracle request listener stopping");
                Ok(())
            }
        }
    }

    async fn drain(&self, mut subscription: RequestSubscription) -> Result<(), ListenerError> {
        while let Some(event) = subscription.next().await {
            match event {
                Ok(request) => {
                    info!(
                        index = request.request_index,
                        airline = %request.airline,
                        flight = %request.flight,
                        timestamp = request.timestamp,
                        "oracle request received"
                    );
                    self.engine.spawn_round(request);
                }
                Err(err) => {
                    error!(error = %err, "oracle request subscription error");
                }
            }
        }

        Err(ListenerError::StreamEnded)
    }
}

/// Keep the listener running, resubscribing with backoff when it fails.
pub async fn supervise(listener: RequestListener, mut shutdown: broadcast::Receiver<()>) {
    let mut restart_count: u32 = 0;

    loop {
        match listener.run(&mut shutdown).await {
            Ok(()) => {
                info!("oracle request listener exited cleanly; stopping supervisor");
                break;
            }
            Err(err) => {
                error!(error = %err, "oracle request listener failed; restarting");
            }
        }

        restart_count = restart_count.saturating_add(1);
        let backoff = restart_backoff(restart_count);
        warn!(
            restart_count,
            backoff_seconds = backoff.as_secs(),
            "oracle request listener restart backoff"
        );

        tokio::select! {
            _ = sleep(backoff) => {}
            _ = shutdown.recv() => {
                info!("shutdown during listener backoff");
                break;
            }
        }
    }
}
