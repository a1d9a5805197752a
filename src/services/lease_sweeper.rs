use crate::AppState;
use tokio::sync::watch;
use tokio::time::{Duration, interval};

/// Background task that revokes object URLs staged over HTTP and never
/// revoked or persisted by their client.
pub struct LeaseSweeper {
    state: AppState,
    ttl: Duration,
    shutdown: watch::Receiver<bool>,
}

impl LeaseSweeper {
    pub fn new(state: AppState, ttl: Duration, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            state,
            ttl,
            shutdown,
        }
    }

    /// Sweep period: a quarter of the TTL, between one second and a minute.
    pub fn period(&self) -> Duration {
        (self.ttl / 4).clamp(Duration::from_secs(1), Duration::from_secs(60))
    }

    pub async fn run(mut self) {
        tracing::info!("🧹 Lease sweeper started (ttl {:?})", self.ttl);
        let mut ticker = interval(self.period());

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Lease sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep_once();
                }
            }
        }
    }

    pub fn sweep_once(&self) -> usize {
        let expired = self.state.sweep_leases(self.ttl);
        if expired > 0 {
            tracing::info!(
                "🧹 Revoked {} abandoned object URL(s), {} still staged",
                expired,
                self.state.leases.len()
            );
        }
        expired
    }
}
