//! Polymarket Data API client for fetching account positions.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::ProviderError;
use crate::models::PositionEntry;
use crate::traits::PositionProvider;

use super::types::PositionResponse;

pub const DATA_API_BASE: &str = "https://data-api.polymarket.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest page the positions endpoint serves.
const POSITIONS_LIMIT: u32 = 500;

/// Pages fetched before a snapshot is refused as too large.
const MAX_POSITION_PAGES: u32 = 20;

/// Client for Polymarket Data API (read-only operations).
pub struct DataClient {
    client: Client,
    base_url: String,
    page_limit: u32,
}

impl DataClient {
    /// Create with custom base URL.
    pub fn with_base_url(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_limit: POSITIONS_LIMIT,
        })
    }

    fn positions_url(&self, address: &str, offset: u64) -> String {
        // sizeThreshold=0 so small holdings are compared too
        format!(
            "{}/positions?user={}&sizeThreshold=0&limit={}&offset={}",
            self.base_url, address, self.page_limit, offset
        )
    }

    async fn fetch_page(&self, address: &str, offset: u64) -> Result<Vec<PositionResponse>, ProviderError> {
        let url = self.positions_url(address, offset);
        debug!(url = %url, "Fetching positions page");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PositionProvider for DataClient {
    /// Fetch every page of positions; a snapshot is only useful if complete.
    async fn fetch_positions(&self, address: &str) -> Result<Vec<PositionEntry>, ProviderError> {
        let mut entries = Vec::new();
        let mut offset: u64 = 0;

        for _ in 0..MAX_POSITION_PAGES {
            let page = self.fetch_page(address, offset).await?;
            let count = page.len();
            entries.extend(page.into_iter().map(PositionEntry::from));

            if count < self.page_limit as usize {
                // Last page
                debug!(address = %address, count = entries.len(), "Fetched positions");
                return Ok(entries);
            }
            offset += self.page_limit as u64;
        }

        Err(ProviderError::TooManyPositions {
            fetched: entries.len(),
        })
    }
}
