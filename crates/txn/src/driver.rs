//! Periodic check driver
//!
//! Ticks the transactional message check on a fixed cadence. Overlapping
//! scans are impossible by construction: the loop finishes one check
//! before awaiting the next tick, and missed ticks are skipped rather than
//! bursted.

use crate::config::CheckConfig;
use crate::listener::CheckListener;
use crate::service::TransactionalMessageService;
use ferrymq_store::StoreBridge;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Start the periodic check task
pub fn start<B, L>(
    service: Arc<TransactionalMessageService<B>>,
    config: CheckConfig,
    listener: Arc<L>,
) -> JoinHandle<()>
where
    B: StoreBridge + 'static,
    L: CheckListener + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            service.check(
                config.transaction_timeout,
                config.transaction_check_max,
                listener.as_ref(),
            );
        }
    })
}
