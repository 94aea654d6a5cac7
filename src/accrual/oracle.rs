use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::OracleError;
use crate::shutdown::Shutdown;

/// Accrual oracle connection settings
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub base_url: String,
    /// Delay between attempts when the oracle answers 429 without `Retry-After`
    pub retry_after: Duration,
    /// Retries allowed after the first rate-limited attempt
    pub retry_count: u32,
    pub request_timeout: Duration,
}

/// Order status as reported by the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OracleStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
    #[serde(other)]
    Unknown,
}

/// Response body of `GET /api/orders/{number}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualRecord {
    pub order: String,
    pub status: OracleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accrual: Option<Decimal>,
}

#[async_trait]
pub trait AccrualOracle: Send + Sync {
    /// `Ok(None)` means the oracle does not know the order yet.
    async fn fetch_accrual(
        &self,
        number: &str,
        shutdown: &Shutdown,
    ) -> Result<Option<AccrualRecord>, OracleError>;
}

/// HTTP client for the external accrual system
pub struct HttpAccrualOracle {
    client: Client,
    config: OracleConfig,
}

impl HttpAccrualOracle {
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }

    fn order_url(&self, number: &str) -> String {
        format!(
            "{}/api/orders/{}",
            self.config.base_url.trim_end_matches('/'),
            number
        )
    }

    /// Server-supplied delay, whole seconds only.
    fn retry_after(response: &Response) -> Option<Duration> {
        response
            .headers()
            .get(RETRY_AFTER)?
            .to_str()
            .ok()?
            .trim()
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }

    async fn decode(response: Response) -> Result<AccrualRecord, OracleError> {
        let body = response.bytes().await?;
        let record: AccrualRecord =
            serde_json::from_slice(&body).map_err(|e| OracleError::Decode(e.to_string()))?;

        if let Some(accrual) = record.accrual {
            if accrual.is_sign_negative() {
                return Err(OracleError::InvalidRecord(format!(
                    "negative accrual {} for order {}",
                    accrual, record.order
                )));
            }
        }

        Ok(record)
    }
}

#[async_trait]
impl AccrualOracle for HttpAccrualOracle {
    async fn fetch_accrual(
        &self,
        number: &str,
        shutdown: &Shutdown,
    ) -> Result<Option<AccrualRecord>, OracleError> {
        let url = self.order_url(number);
        let mut shutdown = shutdown.clone();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let response = self.client.get(&url).send().await?;

            match response.status() {
                StatusCode::OK => {
                    let record = Self::decode(response).await?;
                    debug!("Oracle answered for order {}: {:?}", number, record.status);
                    return Ok(Some(record));
                }
                StatusCode::NO_CONTENT => return Ok(None),
                StatusCode::TOO_MANY_REQUESTS => {
                    if attempt > self.config.retry_count {
                        return Err(OracleError::RateLimited { attempts: attempt });
                    }

                    let delay = Self::retry_after(&response).unwrap_or(self.config.retry_after);
                    warn!(
                        "⏳ Oracle rate limited order {} (attempt {}), retrying in {:?}",
                        number, attempt, delay
                    );

                    tokio::select! {
                        biased;
                        _ = shutdown.recv() => return Err(OracleError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                other => return Err(OracleError::UnexpectedStatus(other.as_u16())),
            }
        }
    }
}
