//! HTTP stock lookup client.
//!
//! `GET {base}/stock/{product_id}` or `GET {base}/stock/{product_id}/{variant_id}`
//! returning `{"available": <integer>}`. A 404 means the item is not sold
//! (ceiling 0); negative availability is treated as 0.

use std::sync::Arc;

use cart_sync_core::LineKey;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use super::{StockError, StockOracle};
use crate::config::StockConfig;

/// Stock service response body.
#[derive(Debug, Deserialize)]
struct StockResponse {
    available: i64,
}

/// Client for the stock lookup service.
#[derive(Clone)]
pub struct HttpStockOracle {
    inner: Arc<HttpStockOracleInner>,
}

struct HttpStockOracleInner {
    client: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl HttpStockOracle {
    /// Create a client for the given service.
    #[must_use]
    pub fn new(base_url: Url, token: Option<SecretString>) -> Self {
        Self {
            inner: Arc::new(HttpStockOracleInner {
                client: reqwest::Client::new(),
                base_url,
                token,
            }),
        }
    }

    /// Create a client from configuration, if an API URL is configured.
    #[must_use]
    pub fn from_config(config: &StockConfig) -> Option<Self> {
        config
            .api_url
            .clone()
            .map(|url| Self::new(url, config.api_token.clone()))
    }

    fn lookup_url(&self, key: LineKey) -> Result<Url, StockError> {
        stock_url(&self.inner.base_url, key)
    }
}

/// Build the lookup URL for a line key under `base`.
fn stock_url(base: &Url, key: LineKey) -> Result<Url, StockError> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| StockError::Parse(format!("stock API URL cannot be a base: {base}")))?;
        segments.pop_if_empty().push("stock").push(&key.product_id.to_string());
        if let Some(variant) = key.variant_id {
            segments.push(&variant.to_string());
        }
    }
    Ok(url)
}

/// Convert a service availability figure into a ceiling.
fn ceiling_from_available(available: i64) -> u32 {
    u32::try_from(available.max(0)).unwrap_or(u32::MAX)
}

impl StockOracle for HttpStockOracle {
    #[instrument(skip(self))]
    async fn current_ceiling(&self, key: LineKey) -> Result<u32, StockError> {
        let url = self.lookup_url(key)?;
        let mut request = self.inner.client.get(url);
        if let Some(token) = &self.inner.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(StockError::RateLimited(retry_after));
        }

        if status == StatusCode::NOT_FOUND {
            debug!("Stock service does not know this item, treating as sold out");
            return Ok(0);
        }

        let body = response.error_for_status()?.text().await?;
        let parsed: StockResponse = serde_json::from_str(&body).map_err(|e| {
            StockError::Parse(format!(
                "{e}: {}",
                body.chars().take(200).collect::<String>()
            ))
        })?;

        let ceiling = ceiling_from_available(parsed.available);
        debug!(ceiling, "Fetched stock ceiling");
        Ok(ceiling)
    }
}
