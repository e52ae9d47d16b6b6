//! Background cleanup of expired invite records and idle per-user locks.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time;

use crate::engine::Engine;
use crate::store::Stores;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub invites_purged: usize,
    pub locks_dropped: usize,
}

/// One pass. Records are kept `grace` past their expiry.
pub async fn sweep_once(engine: &Engine, stores: &Stores, grace: chrono::Duration) -> SweepReport {
    let cutoff = Utc::now() - grace;
    let invites_purged = match stores.registry.purge_expired(cutoff).await {
        Ok(n) => n,
        Err(err) => {
            tracing::warn!(?err, "invite purge failed");
            0
        }
    };
    let locks_dropped = engine.issuance.sweep_locks();

    SweepReport {
        invites_purged,
        locks_dropped,
    }
}

/// Run [`sweep_once`] every `every` until `shutdown` flips to true.
pub async fn run(
    engine: Arc<Engine>,
    stores: Stores,
    grace: chrono::Duration,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = time::interval(every);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = sweep_once(&engine, &stores, grace).await;
                if report != SweepReport::default() {
                    tracing::debug!(?report, "sweep finished");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    tracing::info!("sweeper stopped");
}
