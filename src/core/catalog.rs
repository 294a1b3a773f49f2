//! Book catalog abstractions

use crate::core::pricing::ItemPrice;
use crate::core::rental::ItemId;
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: ItemId,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub rental_price: Option<Decimal>,
}

impl Book {
    pub fn item_price(&self) -> ItemPrice {
        ItemPrice {
            price: self.price,
            rental_price: self.rental_price,
        }
    }
}

#[async_trait]
pub trait BookCatalog: Send + Sync {
    async fn fetch_book(&self, id: ItemId) -> Result<Book>;
}
