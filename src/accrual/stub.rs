// Scripted accrual oracle for tests.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, Ordering};

use super::oracle::{AccrualOracle, AccrualRecord, OracleStatus};
use crate::error::OracleError;
use crate::shutdown::Shutdown;

type Reply = Box<dyn Fn(&str) -> Result<Option<AccrualRecord>, OracleError> + Send + Sync>;

pub struct StubOracle {
    reply: Reply,
    calls: AtomicU32,
}

impl StubOracle {
    pub fn new<F>(reply: F) -> Self
    where
        F: Fn(&str) -> Result<Option<AccrualRecord>, OracleError> + Send + Sync + 'static,
    {
        Self {
            reply: Box::new(reply),
            calls: AtomicU32::new(0),
        }
    }

    /// Answers every order with the given status and accrual.
    pub fn answering(status: OracleStatus, accrual: Option<Decimal>) -> Self {
        Self::new(move |number| {
            Ok(Some(AccrualRecord {
                order: number.to_string(),
                status,
                accrual,
            }))
        })
    }

    pub fn not_registered() -> Self {
        Self::new(|_| Ok(None))
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccrualOracle for StubOracle {
    async fn fetch_accrual(
        &self,
        number: &str,
        _shutdown: &Shutdown,
    ) -> Result<Option<AccrualRecord>, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.reply)(number)
    }
}
