use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::extract::ListingExtractor;
use super::SnapshotSource;
use crate::config::CatalogConfig;
use crate::models::ListingObservation;
use crate::utils::error::AppError;
use crate::Result;

#[derive(Debug, Serialize)]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    data: Option<ScrapeData>,
}

#[derive(Debug, Deserialize)]
struct ScrapeData {
    html: Option<String>,
}

/// Renders the catalog page through a Firecrawl-compatible scrape API and
/// extracts listings from the returned HTML.
pub struct FirecrawlSource {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    catalog_url: String,
    max_items: usize,
    extractor: ListingExtractor,
}

impl FirecrawlSource {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/v1/scrape", config.api_base.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            catalog_url: config.url.clone(),
            max_items: config.max_items,
            extractor: ListingExtractor::new(&config.base_url, &config.currency_marker)?,
        })
    }

    /// The key is only required once a fetch actually happens, so skipped runs
    /// work without one.
    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AppError::Configuration("catalog.api_key is not set".into()))
    }

    async fn fetch_html(&self) -> Result<String> {
        let api_key = self.api_key()?;
        let request = ScrapeRequest {
            url: &self.catalog_url,
            formats: ["html"],
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::UpstreamFetch(format!(
                "scrape API returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body: ScrapeResponse = resp.json().await?;
        body.data
            .and_then(|d| d.html)
            .filter(|html| !html.trim().is_empty())
            .ok_or_else(|| AppError::UpstreamFetch("scrape API returned no HTML".to_string()))
    }
}

#[async_trait]
impl SnapshotSource for FirecrawlSource {
    async fn fetch(&self) -> Result<Vec<ListingObservation>> {
        tracing::debug!(url = %self.catalog_url, "Fetching catalog page");
        let html = self.fetch_html().await?;
        let listings = self.extractor.extract(&html, self.max_items);
        tracing::info!(parsed = listings.len(), "Catalog fetched");
        Ok(listings)
    }
}
