//! HTTP endpoint receiving alertmanager webhook notifications.
//!
//! Decoded batches are handed to the [relay](crate::relay)
use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{body::Bytes, extract::State, http::StatusCode, routing::any, Router};
use prometheus::{IntCounter, IntCounterVec, Registry};
use tokio::net::TcpListener;

use crate::{alert, relay::Relay};

#[derive(Debug)]
struct Metrics {
	notifications: IntCounterVec,
	alerts: IntCounter,
}

impl Metrics {
	fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
		use prometheus::opts;

		let notifications = IntCounterVec::new(
			opts!("received_notifications", "total number of received alertmanager notifications")
				.namespace("alertmanager_discord")
				.subsystem("alertmanager_webhook"),
			&["outcome"],
		)?;
		registry.register(Box::new(notifications.clone()))?;

		let alerts = IntCounter::with_opts(
			opts!("received_alerts", "total number of deserialized alerts")
				.namespace("alertmanager_discord")
				.subsystem("alertmanager_webhook"),
		)?;
		registry.register(Box::new(alerts.clone()))?;

		Ok(Self { notifications, alerts })
	}
}

/// state shared by all requests, read-only after startup
#[derive(Debug)]
pub struct ReceiverState {
	relay: Relay,
	verbose: bool,
	metrics: Metrics,
}

impl ReceiverState {
	/// # Arguments
	///
	/// * `relay` - delivers the decoded alerts
	///
	/// * `verbose` - log every raw request body
	///
	/// * `registry` - where the receiver metrics get registered
	pub fn new(relay: Relay, verbose: bool, registry: &Registry) -> Result<Self> {
		let metrics = Metrics::new(registry).context("failed to register receiver metrics")?;

		Ok(Self { relay, verbose, metrics })
	}
}

async fn alertmanager_receiver(State(state): State<Arc<ReceiverState>>, body: Bytes) -> StatusCode {
	let ReceiverState { relay, verbose, metrics } = &*state;

	if *verbose {
		tracing::info!("body: {}", String::from_utf8_lossy(&body));
	}

	match alert::decode(&body) {
		Ok(batch) => {
			metrics.notifications.with_label_values(&["ok"]).inc();
			metrics.alerts.inc_by(batch.alerts().len() as u64);

			let report = relay.relay(&batch).await;
			if report.failed > 0 {
				tracing::warn!(
					delivered = report.delivered,
					failed = report.failed,
					"not all alert groups could be delivered"
				);
			}

			StatusCode::OK
		}
		Err(err) => {
			metrics.notifications.with_label_values(&["malformed"]).inc();
			tracing::warn!("failed to deserialize alert: {err}");
			StatusCode::BAD_REQUEST
		}
	}
}

/// router serving the alertmanager webhook on `/`. The method isn't checked.
pub fn router(state: Arc<ReceiverState>) -> Router {
	Router::new().route("/", any(alertmanager_receiver)).with_state(state)
}

pub async fn run_alertmanager_receiver(
	state: Arc<ReceiverState>,
	addr: SocketAddr,
	shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
	let listener =
		TcpListener::bind(addr).await.context(format!("failed to bind listen address {addr}"))?;

	tracing::info!("Starting listening on {addr}");

	axum::serve(listener, router(state))
		.with_graceful_shutdown(shutdown)
		.await
		.context("alertmanager endpoint crashed")?;

	Ok(())
}
