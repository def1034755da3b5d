//! HTTP client for the pull endpoints.

use crate::error::{RestError, RestResult};
use crate::source::{BoxFuture, CandleSource, SnapshotSource};
use depthline_core::{Candle, OhlcSubscription, RawSnapshot, Subscription};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Pull endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConfig {
    /// Backend base URL (e.g. `http://127.0.0.1:8000`).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout (ms). Default: 10,000.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Client for the `order_book/` and `ohlc/` endpoints.
#[derive(Debug, Clone)]
pub struct HttpPullClient {
    client: Client,
    base_url: String,
}

impl HttpPullClient {
    /// Create a new pull client.
    pub fn new(config: &RestConfig) -> RestResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RestError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch a full book snapshot.
    ///
    /// The server answers `null` when the exchange call fails; that is
    /// reported as [`RestError::EmptyResponse`].
    pub async fn fetch_order_book(
        &self,
        subscription: &Subscription,
        limit: Option<u32>,
    ) -> RestResult<RawSnapshot> {
        let mut query = vec![
            ("exchange", subscription.exchange.clone()),
            ("pair", subscription.pair.clone()),
        ];
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }

        let snapshot: RawSnapshot = self.get_json("order_book/", &query).await?;
        snapshot
            .validate()
            .map_err(|e| RestError::ParseError(format!("order_book/: {e}")))?;

        debug!(
            %subscription,
            bids = snapshot.bids.len(),
            asks = snapshot.asks.len(),
            "Order book snapshot fetched"
        );
        Ok(snapshot)
    }

    /// Fetch candle history, in server order.
    pub async fn fetch_ohlc(&self, subscription: &OhlcSubscription) -> RestResult<Vec<Candle>> {
        let query = [
            ("exchange", subscription.exchange.clone()),
            ("pair", subscription.pair.clone()),
            ("timeframe", subscription.timeframe.clone()),
        ];
        let candles: Vec<Candle> = self.get_json("ohlc/", &query).await?;
        debug!(%subscription, count = candles.len(), "Candles fetched");
        Ok(candles)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> RestResult<T> {
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| RestError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%url, status = status.as_u16(), "Pull endpoint returned error status");
            return Err(RestError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| RestError::HttpClient(format!("Failed to read response: {e}")))?;

        let parsed: Option<T> = serde_json::from_str(&body)
            .map_err(|e| RestError::ParseError(format!("{path}: {e}")))?;
        parsed.ok_or_else(|| RestError::EmptyResponse(path.to_string()))
    }
}

impl SnapshotSource for HttpPullClient {
    fn fetch_snapshot<'a>(
        &'a self,
        subscription: &'a Subscription,
        limit: Option<u32>,
    ) -> BoxFuture<'a, RestResult<RawSnapshot>> {
        Box::pin(self.fetch_order_book(subscription, limit))
    }
}

impl CandleSource for HttpPullClient {
    fn fetch_candles<'a>(
        &'a self,
        subscription: &'a OhlcSubscription,
    ) -> BoxFuture<'a, RestResult<Vec<Candle>>> {
        Box::pin(self.fetch_ohlc(subscription))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RestConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.timeout_ms, 10_000);
    }

    #[test]
    fn test_config_partial_fields() {
        let config: RestConfig = serde_json::from_str(r#"{"base_url": "http://api:8000/"}"#).unwrap();
        assert_eq!(config.timeout_ms, 10_000);

        let client = HttpPullClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://api:8000");
    }
}
