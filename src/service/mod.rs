pub mod ltp;

pub use ltp::PriceService;
