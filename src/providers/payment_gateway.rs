use crate::core::{GatewayResponse, PaymentGateway, PaymentRequest};
use crate::providers::util::http_client;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// Client for `POST {base_url}/payments/process/`.
pub struct PaymentGatewayApi {
    base_url: String,
    client: reqwest::Client,
}

impl PaymentGatewayApi {
    /// Requests that get no answer within `timeout` fail with an error.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(PaymentGatewayApi {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

#[async_trait]
impl PaymentGateway for PaymentGatewayApi {
    #[instrument(
        name = "GatewaySubmit",
        skip(self, request),
        fields(book_id = request.book_id, transaction_id = %request.transaction_id)
    )]
    async fn submit(&self, request: &PaymentRequest) -> Result<GatewayResponse> {
        let url = format!("{}/payments/process/", self.base_url);
        debug!("Posting payment to {}", url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for URL: {}", e, url))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to get payment response text")?;
        debug!(%status, "Received gateway response");

        if status.is_success() {
            return serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse payment response: '{text}'"));
        }

        // Declines come back as error statuses carrying a message
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(ErrorBody { message, error }) if message.is_some() || error.is_some() => {
                Ok(GatewayResponse {
                    success: false,
                    message: message.or(error),
                    transaction_id: None,
                })
            }
            _ => Err(anyhow!("HTTP error: {} from payment gateway", status)),
        }
    }
}
