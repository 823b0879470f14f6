use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::debug;

use crate::data::context::RequestContext;
use crate::data::retry::{self, Outcome, RetryPolicy};
use crate::data::types::{SymbolPrices, TickerSource};
use crate::error::{PriceError, UpstreamError};

pub const DEFAULT_BASE_URL: &str = "https://api.kraken.com";

const MAX_ERROR_BODY: usize = 2048;

/// Ticker client for the Kraken public API, batching all symbols into one request.
pub struct KrakenClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct TickerResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: HashMap<String, Value>,
}

impl KrakenClient {
    pub fn new(base_url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self, reqwest::Error> {
        let base_url = match base_url.trim_end_matches('/') {
            "" => DEFAULT_BASE_URL.to_string(),
            trimmed => trimmed.to_string(),
        };
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One HTTP round-trip, unclassified.
    async fn fetch_once(&self, url: &str, pairs: &str) -> Result<SymbolPrices, UpstreamError> {
        let response = self
            .client
            .get(url)
            .query(&[("pair", pairs)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let bytes = response.bytes().await?;
        let ticker: TickerResponse = serde_json::from_slice(&bytes)?;
        if !ticker.error.is_empty() {
            return Err(UpstreamError::Api(ticker.error.join("; ")));
        }

        Ok(parse_last_trades(ticker.result))
    }
}

#[async_trait]
impl TickerSource for KrakenClient {
    async fn last_trade_closed(
        &self,
        ctx: &RequestContext,
        symbols: &[String],
    ) -> Result<SymbolPrices, PriceError> {
        let mut seen = HashSet::with_capacity(symbols.len());
        let unique: Vec<&str> = symbols
            .iter()
            .map(String::as_str)
            .filter(|s| seen.insert(*s))
            .collect();
        if unique.is_empty() {
            return Ok(SymbolPrices::new());
        }

        let url = format!("{}/0/public/Ticker", self.base_url);
        let pairs = unique.join(",");
        debug!("Fetching Kraken ticker for {}", pairs);

        let (url, pairs) = (url.as_str(), pairs.as_str());
        retry::execute(&self.retry, ctx, move |_| async move {
            Outcome::from(self.fetch_once(url, pairs).await)
        })
        .await
    }
}

/// `result.<symbol>.c[0]` is the last trade closed price; entries without a
/// parsable price are dropped.
fn parse_last_trades(result: HashMap<String, Value>) -> SymbolPrices {
    result
        .into_iter()
        .filter_map(|(symbol, data)| {
            let price = data["c"][0].as_str().and_then(|p| p.parse::<f64>().ok());
            if price.is_none() {
                debug!("No parsable last trade for {}", symbol);
            }
            price.map(|p| (symbol, p))
        })
        .collect()
}
