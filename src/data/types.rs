use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::data::context::RequestContext;
use crate::error::PriceError;

/// Upstream symbol -> last traded price.
pub type SymbolPrices = HashMap<String, f64>;

/// Caller-facing pair -> last traded price, ordered by pair.
pub type PriceResult = BTreeMap<String, f64>;

/// Batched last-trade lookup against an upstream ticker.
///
/// A successful call may omit symbols the upstream had no price for.
#[async_trait]
pub trait TickerSource: Send + Sync {
    async fn last_trade_closed(
        &self,
        ctx: &RequestContext,
        symbols: &[String],
    ) -> Result<SymbolPrices, PriceError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LtpEntry {
    pub pair: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LtpResponse {
    pub ltp: Vec<LtpEntry>,
}

impl From<PriceResult> for LtpResponse {
    fn from(prices: PriceResult) -> Self {
        Self {
            ltp: prices
                .into_iter()
                .map(|(pair, amount)| LtpEntry { pair, amount })
                .collect(),
        }
    }
}
