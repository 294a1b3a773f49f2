//! Payment gateway abstractions

use crate::core::rental::{DeliveryMethod, ItemId};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Body of a payment submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRequest {
    pub book_id: ItemId,
    pub payment_method: String,
    pub amount_usd: Decimal,
    pub amount_etb: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub transaction_id: String,
    pub exchange_rate: Decimal,
    pub rental_duration: u32,
    pub delivery_method: DeliveryMethod,
    pub return_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

/// Performs exactly one charge attempt per call. No retries, no caching.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn submit(&self, request: &PaymentRequest) -> Result<GatewayResponse>;
}
