//! Currency conversion: the USD to local-currency quote and its fallback.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Local currency units per USD used whenever no live quote is available.
pub const FALLBACK_RATE: Decimal = dec!(55);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateSource {
    Live,
    Fallback,
}

/// Local currency units per USD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub value: Decimal,
    pub fetched_at: DateTime<Utc>,
    pub source: RateSource,
}

impl ExchangeRate {
    pub fn live(value: Decimal, fetched_at: DateTime<Utc>) -> Self {
        Self {
            value,
            fetched_at,
            source: RateSource::Live,
        }
    }

    pub fn fallback(at: DateTime<Utc>) -> Self {
        Self {
            value: FALLBACK_RATE,
            fetched_at: at,
            source: RateSource::Fallback,
        }
    }
}

/// An external quote service for the fixed USD to local-currency pair.
#[async_trait]
pub trait RateQuoteSource: Send + Sync {
    async fn fetch_usd_rate(&self) -> Result<Decimal>;
}

/// Process-wide holder of the current exchange rate.
///
/// Every call to [`ExchangeRateProvider::get_rate`] re-attempts the quote.
/// Failures never reach the caller: the rate silently becomes
/// [`FALLBACK_RATE`] and the next call tries again.
pub struct ExchangeRateProvider {
    source: Arc<dyn RateQuoteSource>,
    current: RwLock<ExchangeRate>,
}

impl ExchangeRateProvider {
    pub fn new(source: Arc<dyn RateQuoteSource>) -> Self {
        Self {
            source,
            current: RwLock::new(ExchangeRate::fallback(Utc::now())),
        }
    }

    pub async fn get_rate(&self) -> ExchangeRate {
        let rate = match self.source.fetch_usd_rate().await {
            Ok(value) if value > Decimal::ZERO => {
                debug!("Fetched exchange rate {}", value);
                ExchangeRate::live(value, Utc::now())
            }
            Ok(value) => {
                warn!(
                    "Quote service returned non-positive rate {}. Using fallback {}",
                    value, FALLBACK_RATE
                );
                ExchangeRate::fallback(Utc::now())
            }
            Err(e) => {
                warn!(
                    "Failed fetching exchange rate: {}. Using fallback {}",
                    e, FALLBACK_RATE
                );
                ExchangeRate::fallback(Utc::now())
            }
        };

        *self.current.write().await = rate;
        rate
    }

    /// The last known rate, without contacting the quote service.
    pub async fn current(&self) -> ExchangeRate {
        *self.current.read().await
    }

    /// Refreshes the cached rate every `period` until the handle is aborted.
    pub fn spawn_refresh(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                self.get_rate().await;
            }
        })
    }
}
