use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::data::cache::TtlCache;
use crate::data::context::RequestContext;
use crate::data::pairs;
use crate::data::types::{PriceResult, TickerSource};
use crate::error::PriceError;
use crate::monitoring::metrics;

/// Last-traded-price lookups with a write-through cache in front of the ticker.
///
/// Prices are cached per upstream symbol rather than per request, so
/// different pair sets share entries.
pub struct PriceService {
    ticker: Arc<dyn TickerSource>,
    cache: TtlCache<String, f64>,
}

impl PriceService {
    pub fn new(ticker: Arc<dyn TickerSource>, ttl: Duration) -> Self {
        Self {
            ticker,
            cache: TtlCache::new(ttl),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache.ttl()
    }

    /// Prices for `requested` pairs, fetching cache misses in one batched call.
    ///
    /// Pairs whose price the upstream did not return are omitted. Any upstream
    /// failure fails the whole request, even when part of it was cached.
    pub async fn get_prices(
        &self,
        ctx: &RequestContext,
        requested: &[String],
    ) -> Result<PriceResult, PriceError> {
        // 1. Reject empty requests
        if requested.is_empty() {
            return Err(PriceError::EmptyRequest);
        }

        // 2. Pairs -> unique upstream symbols
        let symbols = pairs::to_symbols(requested)?;

        // 3. Split into cached and missing
        let mut known: HashMap<String, f64> = HashMap::with_capacity(symbols.len());
        let mut missing = Vec::new();
        for symbol in symbols {
            match self.cache.get(&symbol) {
                Some(price) => {
                    metrics::record_cache_lookup(true);
                    known.insert(symbol, price);
                }
                None => {
                    metrics::record_cache_lookup(false);
                    missing.push(symbol);
                }
            }
        }
        debug!("Cache: {} hit, {} missing", known.len(), missing.len());

        // 4. One batched upstream call for the misses
        if !missing.is_empty() {
            let call = ctx.run(self.ticker.last_trade_closed(ctx, &missing)).await;
            let fresh = match call.and_then(|fetched| fetched) {
                Ok(fresh) => {
                    metrics::record_upstream_call(true);
                    fresh
                }
                Err(e) => {
                    metrics::record_upstream_call(false);
                    warn!("Ticker fetch failed for {}: {}", missing.join(","), e);
                    return Err(e);
                }
            };

            if fresh.len() < missing.len() {
                debug!("Upstream returned {} of {} symbols", fresh.len(), missing.len());
            }
            for (symbol, price) in fresh {
                self.cache.set(symbol.clone(), price);
                known.insert(symbol, price);
            }
        }

        // 5. Map back to the requested pairs
        Ok(pairs::to_identifiers(requested, &known))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeTicker;
    use super::*;
    use crate::data::kraken::KrakenClient;
    use crate::data::retry::RetryPolicy;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;
    use tokio::time::Instant;

    fn pairs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn all_prices() -> FakeTicker {
        FakeTicker::with_prices(&[
            ("XXBTZUSD", 52000.12),
            ("XXBTZEUR", 50000.12),
            ("XXBTZCHF", 49000.12),
        ])
    }

    #[tokio::test]
    async fn test_caches_results() {
        let ticker = Arc::new(all_prices());
        let service = PriceService::new(ticker.clone(), Duration::from_millis(500));
        let ctx = RequestContext::background();
        let requested = pairs(&["BTC/USD", "BTC/EUR"]);

        let first = service.get_prices(&ctx, &requested).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(ticker.calls().len(), 1);

        let second = service.get_prices(&ctx, &requested).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(ticker.calls().len(), 1, "second request should be served from cache");
    }

    #[tokio::test]
    async fn test_empty_request() {
        let ticker = Arc::new(all_prices());
        let service = PriceService::new(ticker.clone(), Duration::from_secs(1));

        let err = service
            .get_prices(&RequestContext::background(), &[])
            .await
            .unwrap_err();

        assert!(matches!(err, PriceError::EmptyRequest));
        assert!(ticker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_identifier() {
        let ticker = Arc::new(all_prices());
        let service = PriceService::new(ticker.clone(), Duration::from_secs(1));

        let err = service
            .get_prices(&RequestContext::background(), &pairs(&["BTC/USD", "ETH/USD"]))
            .await
            .unwrap_err();

        assert!(matches!(err, PriceError::UnknownIdentifier(p) if p == "ETH/USD"));
        assert!(ticker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fetches_only_missing_symbols() {
        let ticker = Arc::new(all_prices());
        let service = PriceService::new(ticker.clone(), Duration::from_secs(5));
        let ctx = RequestContext::background();

        service.get_prices(&ctx, &pairs(&["BTC/USD"])).await.unwrap();
        let result = service
            .get_prices(&ctx, &pairs(&["BTC/USD", "BTC/EUR"]))
            .await
            .unwrap();

        assert_eq!(result.get("BTC/USD"), Some(&52000.12));
        assert_eq!(result.get("BTC/EUR"), Some(&50000.12));
        assert_eq!(
            ticker.calls(),
            vec![vec!["XXBTZUSD".to_string()], vec!["XXBTZEUR".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_partial_upstream_response_omits_pair() {
        let ticker = Arc::new(FakeTicker::with_prices(&[("XXBTZUSD", 52000.12)]));
        let service = PriceService::new(ticker.clone(), Duration::from_secs(5));
        let ctx = RequestContext::background();

        service.get_prices(&ctx, &pairs(&["BTC/USD"])).await.unwrap();
        let result = service
            .get_prices(&ctx, &pairs(&["BTC/USD", "BTC/EUR"]))
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result.get("BTC/USD"), Some(&52000.12));
        assert_eq!(ticker.calls().last().unwrap(), &vec!["XXBTZEUR".to_string()]);
    }

    #[tokio::test]
    async fn test_upstream_failure_fails_whole_request() {
        let ticker = Arc::new(FakeTicker::failing());
        let service = PriceService::new(ticker.clone(), Duration::from_secs(5));
        service.cache.set("XXBTZUSD".to_string(), 52000.12);

        let err = service
            .get_prices(&RequestContext::background(), &pairs(&["BTC/USD", "BTC/EUR"]))
            .await
            .unwrap_err();

        assert!(matches!(err, PriceError::UpstreamFatal(_)));
        assert_eq!(ticker.calls(), vec![vec!["XXBTZEUR".to_string()]]);
        // The cached entry is untouched
        assert_eq!(service.cache.get("XXBTZUSD"), Some(52000.12));
    }

    #[tokio::test]
    async fn test_all_cached_skips_upstream() {
        let ticker = Arc::new(FakeTicker::failing());
        let service = PriceService::new(ticker.clone(), Duration::from_secs(5));
        service.cache.set("XXBTZUSD".to_string(), 52000.12);

        let result = service
            .get_prices(&RequestContext::background(), &pairs(&["BTC/USD"]))
            .await
            .unwrap();

        assert_eq!(result.get("BTC/USD"), Some(&52000.12));
        assert!(ticker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_expired_entries_are_refetched() {
        let ticker = Arc::new(all_prices());
        let service = PriceService::new(ticker.clone(), Duration::from_millis(20));
        let ctx = RequestContext::background();

        service.get_prices(&ctx, &pairs(&["BTC/CHF"])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        service.get_prices(&ctx, &pairs(&["BTC/CHF"])).await.unwrap();

        assert_eq!(ticker.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_while_waiting_on_upstream() {
        let ticker = Arc::new(all_prices().delayed(Duration::from_secs(10)));
        let service = PriceService::new(ticker.clone(), Duration::from_secs(5));

        let err = service
            .get_prices(
                &RequestContext::with_timeout(Duration::from_millis(100)),
                &pairs(&["BTC/USD"]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PriceError::DeadlineExceeded));
        assert!(service.cache.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_requests_all_complete() {
        let ticker = Arc::new(all_prices().delayed(Duration::from_millis(10)));
        let service = Arc::new(PriceService::new(ticker.clone(), Duration::from_secs(5)));

        let tasks = (0..16).map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .get_prices(
                        &RequestContext::background(),
                        &pairs(&["BTC/USD", "BTC/EUR", "BTC/CHF"]),
                    )
                    .await
            })
        });

        for joined in futures::future::join_all(tasks).await {
            let result = joined.unwrap().unwrap();
            assert_eq!(result.len(), 3);
        }
        // Misses are not coalesced, but every call is a single batch
        let calls = ticker.calls();
        assert!(!calls.is_empty() && calls.len() <= 16);
        assert!(calls.iter().all(|batch| batch.len() == 3));
    }

    async fn overloaded_then_ok(failures: usize) -> String {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new().route(
            "/0/public/Ticker",
            get(move || {
                let hits = Arc::clone(&hits);
                async move {
                    if hits.fetch_add(1, Ordering::SeqCst) < failures {
                        (StatusCode::SERVICE_UNAVAILABLE, String::new())
                    } else {
                        (
                            StatusCode::OK,
                            r#"{"error":[],"result":{"XXBTZUSD":{"c":["52000.12","0.01"]}}}"#
                                .to_string(),
                        )
                    }
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_transient_overload_recovers_with_backoff() {
        let base_url = overloaded_then_ok(2).await;
        let kraken = KrakenClient::new(
            &base_url,
            Duration::from_secs(2),
            RetryPolicy::new(2, Duration::from_millis(25)),
        )
        .unwrap();
        let service = PriceService::new(Arc::new(kraken), Duration::from_secs(5));
        let start = Instant::now();

        let result = service
            .get_prices(&RequestContext::background(), &pairs(&["BTC/USD", "BTC/EUR"]))
            .await
            .unwrap();

        assert_eq!(result.get("BTC/USD"), Some(&52000.12));
        assert!(!result.contains_key("BTC/EUR"));
        // 25ms + 50ms of backoff
        assert!(start.elapsed() >= Duration::from_millis(75));
    }

    #[tokio::test]
    async fn test_deadline_shorter_than_first_backoff() {
        let base_url = overloaded_then_ok(usize::MAX).await;
        let kraken = KrakenClient::new(
            &base_url,
            Duration::from_secs(2),
            RetryPolicy::new(2, Duration::from_millis(400)),
        )
        .unwrap();
        let service = PriceService::new(Arc::new(kraken), Duration::from_secs(5));

        let err = service
            .get_prices(
                &RequestContext::with_timeout(Duration::from_millis(100)),
                &pairs(&["BTC/USD"]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PriceError::DeadlineExceeded));
        assert!(!matches!(err, PriceError::UpstreamUnavailable(_)));
    }
}
