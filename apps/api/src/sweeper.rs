//! # Reservation Sweeper
//!
//! Background task that cancels pending orders whose reservation has
//! outlived the configured TTL, returning the held units to their batches.
//!
//! ```text
//! every sweep_interval_secs
//!      │
//!      ▼
//! cutoff = now - reservation_ttl_minutes
//!      │
//!      ▼
//! orders().expire_pending(cutoff)    pending orders placed before cutoff
//!      │                             → cancelled, reservations released
//!      ▼
//! shutdown signal? ──yes──► exit
//! ```

use std::sync::Arc;

use chrono::Utc;
use pharma_db::{Database, DbResult};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Runs one sweep. Returns the number of orders cancelled.
pub async fn sweep_once(db: &Database, ttl: chrono::Duration) -> DbResult<u64> {
    let cutoff = Utc::now() - ttl;
    let expired = db.orders().expire_pending(cutoff).await?;
    if expired > 0 {
        info!(expired, %cutoff, "Expired pending reservations");
    } else {
        debug!(%cutoff, "No expired reservations");
    }
    Ok(expired)
}

/// Spawns the sweeper. It stops when `shutdown` flips to `true`.
pub fn spawn(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ttl = state.config.reservation_ttl();
        let mut interval = tokio::time::interval(state.config.sweep_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = state.config.sweep_interval_secs,
            ttl_minutes = state.config.reservation_ttl_minutes,
            "Reservation sweeper started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = sweep_once(&state.db, ttl).await {
                        warn!(error = %e, "Reservation sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reservation sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use pharma_db::DbConfig;

    #[tokio::test]
    async fn test_sweep_on_empty_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let expired = sweep_once(&db, chrono::Duration::minutes(30)).await.unwrap();
        assert_eq!(expired, 0);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let state = Arc::new(AppState::new(db, ApiConfig::default()));
        let (tx, rx) = watch::channel(false);

        let handle = spawn(state, rx);
        tx.send(true).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
