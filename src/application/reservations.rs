use super::audit::AuditTrail;
use crate::domain::investment::Investment;
use crate::domain::ports::DatabaseRef;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Returns units held by abandoned checkouts to the pool.
pub struct ReservationSweeper {
    db: DatabaseRef,
    audit: Arc<AuditTrail>,
}

impl ReservationSweeper {
    pub fn new(db: DatabaseRef, audit: Arc<AuditTrail>) -> Self {
        Self { db, audit }
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<Investment>> {
        let released = self.db.release_expired_reservations(now).await?;
        if !released.is_empty() {
            let ids: Vec<_> = released.iter().map(|i| i.id).collect();
            self.audit
                .record("reservations_released", json!({ "investment_ids": ids }))
                .await;
        }
        Ok(released)
    }

    /// Sweeps on a fixed period until the task is dropped.
    pub async fn run_every(self: Arc<Self>, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            match self.sweep(Utc::now()).await {
                Ok(released) if !released.is_empty() => {
                    info!(count = released.len(), "sweeper released holds");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "reservation sweep failed"),
            }
        }
    }
}
