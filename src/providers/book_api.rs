use crate::core::rental::ItemId;
use crate::core::{Book, BookCatalog};
use crate::providers::util::{http_client, with_retry};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

pub struct BookApi {
    base_url: String,
    client: reqwest::Client,
}

impl BookApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(BookApi {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl BookCatalog for BookApi {
    async fn fetch_book(&self, id: ItemId) -> Result<Book> {
        let url = format!("{}/books/{}/", self.base_url, id);
        debug!("Requesting book from {}", url);

        let response = with_retry(|| async { self.client.get(&url).send().await }, 3, 500)
            .await
            .with_context(|| format!("Failed to send request for book: {id}"))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for book: {}",
                response.status(),
                id
            ));
        }

        let response_text = response
            .text()
            .await
            .with_context(|| format!("Failed to get response text for book: {id}"))?;

        let book: Book = serde_json::from_str(&response_text).with_context(|| {
            format!("Failed to parse book response for book: {id}. Response: '{response_text}'")
        })?;
        debug!("Fetched book {}: {}", book.id, book.title);
        Ok(book)
    }
}
