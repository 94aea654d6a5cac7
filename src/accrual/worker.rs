use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use super::oracle::{AccrualOracle, OracleStatus};
use crate::error::{AppError, AppResult};
use crate::ledger::models::{AccrualOrder, OrderStatus, AMOUNT_SCALE};
use crate::ledger::{run_in_transaction, OrderStore};
use crate::shutdown::Shutdown;

/// Shared receiving end of the reconciliation queue
pub type OrderQueue = Arc<Mutex<mpsc::Receiver<AccrualOrder>>>;

/// Result of reconciling one order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Order processed, balance credited with the amount
    Credited(Decimal),
    Invalidated,
    MarkedProcessing,
    /// Oracle does not know the order yet
    NotRegistered,
    /// Oracle answered for a different order number
    Mismatch,
    AlreadyFinal,
    UnknownStatus,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Credited(amount) => write!(f, "credited {}", amount),
            Outcome::Invalidated => write!(f, "invalidated"),
            Outcome::MarkedProcessing => write!(f, "processing"),
            Outcome::NotRegistered => write!(f, "not registered"),
            Outcome::Mismatch => write!(f, "mismatch"),
            Outcome::AlreadyFinal => write!(f, "already final"),
            Outcome::UnknownStatus => write!(f, "unknown status"),
        }
    }
}

pub struct ReconciliationWorker {
    id: usize,
    store: Arc<dyn OrderStore>,
    oracle: Arc<dyn AccrualOracle>,
}

impl ReconciliationWorker {
    pub fn new(id: usize, store: Arc<dyn OrderStore>, oracle: Arc<dyn AccrualOracle>) -> Self {
        Self { id, store, oracle }
    }

    /// Pulls orders until the queue closes or shutdown fires.
    ///
    /// Errors are contained: the order is left as-is and picked up again on
    /// a later poll cycle.
    pub async fn run(self, queue: OrderQueue, mut shutdown: Shutdown) {
        debug!(worker = self.id, "Reconciliation worker started");

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.recv() => None,
                order = async { queue.lock().await.recv().await } => order,
            };

            let Some(order) = next else {
                break;
            };

            match self.process(order.clone(), &shutdown).await {
                Ok(outcome) => {
                    debug!(worker = self.id, order = %order.number, %outcome, "Order reconciled")
                }
                Err(e) => {
                    warn!(worker = self.id, order = %order.number, "Reconciliation failed: {}", e)
                }
            }
        }

        debug!(worker = self.id, "Reconciliation worker stopped");
    }

    /// Reconciles one order snapshot against the oracle.
    pub async fn process(&self, order: AccrualOrder, shutdown: &Shutdown) -> AppResult<Outcome> {
        if order.status.is_terminal() {
            return Ok(Outcome::AlreadyFinal);
        }

        let Some(record) = self.oracle.fetch_accrual(&order.number, shutdown).await? else {
            return Ok(Outcome::NotRegistered);
        };

        if record.order != order.number {
            warn!(
                worker = self.id,
                order = %order.number,
                "Oracle answered for order {}", record.order
            );
            return Ok(Outcome::Mismatch);
        }

        match record.status {
            OracleStatus::Processed => {
                let amount = record
                    .accrual
                    .unwrap_or(Decimal::ZERO)
                    .round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero);
                self.credit(order, amount).await?;
                Ok(Outcome::Credited(amount))
            }
            OracleStatus::Invalid => {
                let mut invalid = order;
                invalid.status = OrderStatus::Invalid;
                self.store.update_accrual_order(&invalid).await?;
                info!(worker = self.id, order = %invalid.number, "🚫 Order rejected by accrual system");
                Ok(Outcome::Invalidated)
            }
            OracleStatus::Processing | OracleStatus::Registered => {
                let mut processing = order;
                processing.status = OrderStatus::Processing;
                self.store.update_accrual_order(&processing).await?;
                Ok(Outcome::MarkedProcessing)
            }
            OracleStatus::Unknown => {
                warn!(worker = self.id, order = %order.number, "Oracle returned an unknown status");
                Ok(Outcome::UnknownStatus)
            }
        }
    }

    /// Marks the order processed and credits its owner, atomically.
    async fn credit(&self, order: AccrualOrder, amount: Decimal) -> AppResult<()> {
        let user_id = order.user_id;
        let mut processed = order;
        processed.status = OrderStatus::Processed;
        processed.amount = Some(amount);
        let number = processed.number.clone();

        run_in_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                tx.update_accrual_order(&processed).await?;

                let mut user = tx
                    .get_user_by_id(user_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;
                user.credit(amount);
                tx.update_user_balance(&user).await?;
                Ok(())
            })
        })
        .await?;

        info!(worker = self.id, order = %number, "✅ Credited {} points to user {}", amount, user_id);
        Ok(())
    }
}
