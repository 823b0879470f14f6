//! Last-traded-price service: a TTL cache at upstream-symbol granularity in
//! front of the Kraken ticker, with batched fetches and bounded retries.

pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod monitoring;
pub mod service;

pub use data::cache::TtlCache;
pub use data::context::RequestContext;
pub use error::{PriceError, UpstreamError};
pub use service::PriceService;
