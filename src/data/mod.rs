pub mod cache;
pub mod context;
pub mod kraken;
pub mod pairs;
pub mod retry;
pub mod types;
