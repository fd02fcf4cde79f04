//! Metrics Endpoint Module
//!
//! Serves the aggregator's counter state on `GET /metrics` in the Prometheus
//! text exposition format. Request-driven and stateless; it only reads the
//! registry, never writes it.

use crate::metrics::Aggregator;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;

/// Prometheus text exposition format content type.
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub fn router(aggregator: Arc<Aggregator>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(aggregator)
}

/// Binds the metrics endpoint and serves until the process exits.
pub async fn serve(port: u16, aggregator: Arc<Aggregator>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    log::info!("Metrics endpoint listening on :{}", port);
    axum::serve(listener, router(aggregator)).await?;
    Ok(())
}

async fn metrics_handler(State(aggregator): State<Arc<Aggregator>>) -> impl IntoResponse {
    match aggregator.render() {
        Ok(body) => ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response(),
        Err(err) => {
            log::error!("Failed to encode metrics: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "encoding failed").into_response()
        }
    }
}
