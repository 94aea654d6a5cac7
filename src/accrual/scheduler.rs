// Reconciliation scheduler - feeds eligible orders to the worker pool
//
// - Polls the order store every `poll_interval`
// - Pushes each order onto the bounded queue (blocks while the queue is full)
// - A store failure ends the loop with an error
// - Returning drops the queue sender, which closes the queue

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::AppResult;
use crate::ledger::models::{AccrualOrder, OrderStatus};
use crate::ledger::OrderStore;
use crate::shutdown::Shutdown;

pub struct ReconciliationScheduler {
    store: Arc<dyn OrderStore>,
    statuses: Vec<OrderStatus>,
    poll_interval: Duration,
}

impl ReconciliationScheduler {
    pub fn new(
        store: Arc<dyn OrderStore>,
        statuses: Vec<OrderStatus>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            statuses,
            poll_interval,
        }
    }

    /// Runs until shutdown, queue closure, or a store failure.
    pub async fn run(
        self,
        queue: mpsc::Sender<AccrualOrder>,
        mut shutdown: Shutdown,
    ) -> AppResult<()> {
        info!(
            "⏰ Reconciliation scheduler started (every {:?}, statuses {:?})",
            self.poll_interval, self.statuses
        );

        loop {
            if !self.poll_once(&queue, &mut shutdown).await? {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Reconciliation scheduler stopped");
        Ok(())
    }

    /// One poll cycle. Returns `false` when the scheduler should stop.
    pub async fn poll_once(
        &self,
        queue: &mpsc::Sender<AccrualOrder>,
        shutdown: &mut Shutdown,
    ) -> AppResult<bool> {
        if shutdown.is_triggered() {
            return Ok(false);
        }

        let orders = match self.store.get_orders_by_status(&self.statuses).await {
            Ok(orders) => orders,
            Err(e) => {
                error!("❌ Failed to load orders for reconciliation: {}", e);
                return Err(e);
            }
        };

        debug!("Enqueueing {} orders", orders.len());

        for order in orders {
            tokio::select! {
                biased;
                _ = shutdown.recv() => return Ok(false),
                sent = queue.send(order) => {
                    if sent.is_err() {
                        // every worker is gone
                        return Ok(false);
                    }
                }
            }
        }

        Ok(true)
    }
}
