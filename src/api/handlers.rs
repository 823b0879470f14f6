use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::AppState;
use crate::data::context::RequestContext;
use crate::data::pairs;
use crate::data::types::LtpResponse;
use crate::error::PriceError;
use crate::monitoring::metrics;

#[derive(Debug, Deserialize)]
pub(crate) struct LtpQuery {
    #[serde(default)]
    pairs: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps service failures onto HTTP status codes.
pub(crate) struct ApiError(PriceError);

impl From<PriceError> for ApiError {
    fn from(err: PriceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = if self.0.is_caller_error() {
            (StatusCode::BAD_REQUEST, self.0.to_string())
        } else if self.0.is_timeout() {
            (StatusCode::GATEWAY_TIMEOUT, "failed to fetch prices".to_string())
        } else {
            (StatusCode::BAD_GATEWAY, "failed to fetch prices".to_string())
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

pub(crate) async fn health() -> &'static str {
    "ok"
}

pub(crate) async fn ltp(
    State(state): State<AppState>,
    Query(query): Query<LtpQuery>,
) -> Result<Json<LtpResponse>, ApiError> {
    let requested = pairs::normalize(query.pairs.as_deref().unwrap_or_default())?;

    let ctx = RequestContext::with_timeout(state.request_timeout);
    let prices = state
        .service
        .get_prices(&ctx, &requested)
        .await
        .inspect_err(|e| error!("LTP fetch failed for {}: {}", requested.join(","), e))?;

    Ok(Json(LtpResponse::from(prices)))
}

pub(crate) async fn metrics_text() -> Response {
    match metrics::render() {
        Some(text) => text.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
