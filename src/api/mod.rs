use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderMap,
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::service::PriceService;

mod handlers;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PriceService>,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(service: Arc<PriceService>, request_timeout: Duration) -> Self {
        Self {
            service,
            request_timeout,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/v1/ltp", get(handlers::ltp))
        .route("/metrics", get(handlers::metrics_text))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or_default().to_string();
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(req.headers(), peer);
    let start = Instant::now();

    let response = next.run(req).await;

    info!(
        method = %method,
        path = %path,
        query = %query,
        ip = %ip,
        status = response.status().as_u16(),
        dur_ms = start.elapsed().as_millis() as u64,
        "http"
    );
    response
}

/// First `X-Forwarded-For` hop if present, else the peer address.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(first) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|xff| xff.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return first.to_string();
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
