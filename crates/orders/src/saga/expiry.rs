//! Closing orders that were never paid.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::OrderOrchestrator;
use crate::error::Result;

impl OrderOrchestrator {
    /// Cancels unpaid orders created more than `order_ttl` before `now`.
    ///
    /// Handles at most `sweep_batch` orders per call and returns how many it
    /// closed. An order whose cancellation fails is logged and skipped.
    #[tracing::instrument(skip(self))]
    pub async fn expire_unpaid(&self, now: DateTime<Utc>) -> Result<usize> {
        let Some(cutoff) = TimeDelta::from_std(self.settings().order_ttl)
            .ok()
            .and_then(|ttl| now.checked_sub_signed(ttl))
        else {
            return Ok(0);
        };

        let numbers = self
            .orders()
            .unpaid_before(cutoff, self.settings().sweep_batch)
            .await?;

        let mut closed = 0;
        for number in &numbers {
            match self.close_and_release(number, None).await {
                Ok(true) => closed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(order_number = %number, error = %e, "failed to expire order");
                }
            }
        }

        if closed > 0 {
            metrics::counter!("orders_expired_total").increment(closed as u64);
        }
        Ok(closed)
    }
}

/// Runs [`OrderOrchestrator::expire_unpaid`] every `sweep_interval`.
///
/// The first sweep runs immediately. Abort the handle to stop the worker.
pub fn spawn_expiry_worker(orchestrator: Arc<OrderOrchestrator>) -> JoinHandle<()> {
    let period = orchestrator
        .settings()
        .sweep_interval
        .max(Duration::from_millis(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match orchestrator.expire_unpaid(Utc::now()).await {
                Ok(0) => {}
                Ok(closed) => tracing::info!(closed, "expired unpaid orders"),
                Err(e) => tracing::warn!(error = %e, "expiry sweep failed"),
            }
        }
    })
}
