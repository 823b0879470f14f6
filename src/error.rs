/// Failure of a single upstream attempt, before retry policy is applied.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("kraken transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("kraken http {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed kraken payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("kraken api error: {0}")]
    Api(String),
}

impl UpstreamError {
    /// Transport failures, 429 and 5xx are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Transport(_) => true,
            UpstreamError::Status { status, .. } => *status == 429 || *status >= 500,
            UpstreamError::Malformed(_) | UpstreamError::Api(_) => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    #[error("no pairs provided")]
    EmptyRequest,

    #[error("unsupported pair: {0}")]
    UnknownIdentifier(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(#[source] UpstreamError),

    #[error("upstream failed: {0}")]
    UpstreamFatal(#[source] UpstreamError),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("request cancelled")]
    Cancelled,
}

impl PriceError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PriceError::DeadlineExceeded | PriceError::Cancelled)
    }

    /// Errors caused by the request itself rather than by the upstream.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, PriceError::EmptyRequest | PriceError::UnknownIdentifier(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let status = |code| UpstreamError::Status { status: code, body: String::new() };

        assert!(status(429).is_retryable());
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!UpstreamError::Api("EQuery:Unknown asset pair".into()).is_retryable());
    }

    #[test]
    fn test_price_error_kinds() {
        assert!(PriceError::DeadlineExceeded.is_timeout());
        assert!(PriceError::Cancelled.is_timeout());
        assert!(!PriceError::UpstreamFatal(UpstreamError::Api("x".into())).is_timeout());
        assert!(PriceError::UnknownIdentifier("ETH/USD".into()).is_caller_error());
        assert!(!PriceError::DeadlineExceeded.is_caller_error());
    }
}
