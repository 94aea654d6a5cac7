// Accrual reconciliation
//
// One scheduler task polls the order store and feeds a bounded queue; a pool
// of workers drains it, asks the accrual oracle about each order and applies
// the resulting transition.

pub mod oracle;
pub mod scheduler;
pub mod worker;

#[cfg(test)]
pub mod stub;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

pub use oracle::{AccrualOracle, HttpAccrualOracle, OracleConfig};
pub use scheduler::ReconciliationScheduler;
pub use worker::ReconciliationWorker;

use crate::error::{AppError, AppResult};
use crate::ledger::models::OrderStatus;
use crate::ledger::OrderStore;
use crate::shutdown::Shutdown;

/// Reconciler configuration
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub poll_interval: Duration,
    pub workers: usize,
    /// Statuses the scheduler polls for
    pub poll_statuses: Vec<OrderStatus>,
}

impl ReconcilerConfig {
    pub fn queue_capacity(&self) -> usize {
        (self.workers * 2).max(1)
    }
}

pub struct AccrualReconciler {
    config: ReconcilerConfig,
    store: Arc<dyn OrderStore>,
    oracle: Arc<dyn AccrualOracle>,
}

impl AccrualReconciler {
    pub fn new(
        config: ReconcilerConfig,
        store: Arc<dyn OrderStore>,
        oracle: Arc<dyn AccrualOracle>,
    ) -> Self {
        Self {
            config,
            store,
            oracle,
        }
    }

    /// Spawns the scheduler and the worker pool.
    pub fn start(&self, shutdown: Shutdown) -> ReconcilerHandle {
        let (tx, rx) = mpsc::channel(self.config.queue_capacity());
        let queue = Arc::new(Mutex::new(rx));

        let workers = (0..self.config.workers)
            .map(|id| {
                let worker = ReconciliationWorker::new(id, self.store.clone(), self.oracle.clone());
                tokio::spawn(worker.run(queue.clone(), shutdown.clone()))
            })
            .collect();

        let scheduler = ReconciliationScheduler::new(
            self.store.clone(),
            self.config.poll_statuses.clone(),
            self.config.poll_interval,
        );
        let scheduler = tokio::spawn(scheduler.run(tx, shutdown));

        info!(
            "🚀 Accrual reconciler started with {} workers (queue capacity {})",
            self.config.workers,
            self.config.queue_capacity()
        );

        ReconcilerHandle {
            scheduler: Some(scheduler),
            workers,
        }
    }
}

/// Handles to the running reconciler tasks
pub struct ReconcilerHandle {
    scheduler: Option<JoinHandle<AppResult<()>>>,
    workers: Vec<JoinHandle<()>>,
}

impl ReconcilerHandle {
    /// Resolves when the scheduler exits. An `Err` is a fatal store failure.
    ///
    /// Pending forever once the scheduler result has been taken.
    pub async fn wait_scheduler(&mut self) -> AppResult<()> {
        match self.scheduler.as_mut() {
            Some(handle) => {
                let result = flatten(handle.await);
                self.scheduler = None;
                result
            }
            None => std::future::pending().await,
        }
    }

    /// Waits for the scheduler (if still running) and every worker to exit.
    pub async fn join(self) -> AppResult<()> {
        let mut result = Ok(());

        if let Some(handle) = self.scheduler {
            result = flatten(handle.await);
        }

        for worker in self.workers {
            if let Err(e) = worker.await {
                error!("Reconciliation worker panicked: {}", e);
            }
        }

        info!("Accrual reconciler stopped");
        result
    }
}

fn flatten(joined: Result<AppResult<()>, tokio::task::JoinError>) -> AppResult<()> {
    joined.map_err(|e| AppError::Internal(format!("scheduler task failed: {}", e)))?
}
