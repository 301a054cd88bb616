//! Here we expose prometheus metrics about the relay
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
	extract::State,
	http::{header::CONTENT_TYPE, StatusCode},
	response::{IntoResponse, Response},
	routing::get,
	Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::net::TcpListener;

async fn metrics_handler(State(registry): State<Registry>) -> Response {
	let mut buffer = vec![];
	let encoder = TextEncoder::new();
	let metric_families = registry.gather();

	if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
		tracing::error!("failed to encode metrics: {err}");
		return StatusCode::INTERNAL_SERVER_ERROR.into_response();
	}

	([(CONTENT_TYPE, encoder.format_type().to_owned())], buffer).into_response()
}

pub fn router(registry: Registry) -> Router {
	Router::new().route("/metrics", get(metrics_handler)).with_state(registry)
}

pub async fn run_telemetry_endpoint(
	registry: Registry,
	addr: SocketAddr,
	shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
	let listener =
		TcpListener::bind(addr).await.context(format!("failed to bind telemetry address {addr}"))?;

	tracing::info!("serving metrics on {addr}");

	axum::serve(listener, router(registry))
		.with_graceful_shutdown(shutdown)
		.await
		.context("telemetry endpoint crashed")?;

	Ok(())
}
