use crate::core::RateQuoteSource;
use crate::providers::util::http_client;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

/// Quote service exposing `GET {base_url}/latest/USD`.
pub struct ExchangeRateApi {
    base_url: String,
    currency: String,
    client: reqwest::Client,
}

impl ExchangeRateApi {
    pub fn new(base_url: &str, currency: &str, timeout: Duration) -> Result<Self> {
        Ok(ExchangeRateApi {
            base_url: base_url.trim_end_matches('/').to_string(),
            currency: currency.to_string(),
            client: http_client(timeout)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct LatestRatesResponse {
    rates: HashMap<String, Decimal>,
}

#[async_trait]
impl RateQuoteSource for ExchangeRateApi {
    #[instrument(name = "ExchangeRateFetch", skip(self), fields(currency = %self.currency))]
    async fn fetch_usd_rate(&self) -> Result<Decimal> {
        let url = format!("{}/latest/USD", self.base_url);
        debug!("Requesting exchange rate from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for URL: {}", e, url))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for currency pair: USD{}",
                response.status(),
                self.currency
            ));
        }

        let text = response
            .text()
            .await
            .context("Failed to get exchange rate response text")?;
        let data: LatestRatesResponse = serde_json::from_str(&text).with_context(|| {
            format!("Failed to parse JSON response for USD{}", self.currency)
        })?;

        data.rates
            .get(&self.currency)
            .copied()
            .ok_or_else(|| anyhow!("No rate data found for currency: {}", self.currency))
    }
}
