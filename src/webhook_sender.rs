//! Delivery of rendered messages to the chat webhook.

use std::{fmt::Debug, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use prometheus::{Histogram, IntCounterVec, Registry};
use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

use crate::webhook_message::WebhookMessage;

/// Error occuring when a message couldn't be delivered to the webhook
#[derive(Error, Debug)]
pub enum DeliveryError {
	/// the request failed before a response was received (connect error,
	/// timeout, ...)
	#[error("webhook request failed: {0}")]
	Transport(#[from] reqwest::Error),
	/// the webhook answered with a non-success status
	#[error("webhook responded with status {0}")]
	Status(StatusCode),
}

impl DeliveryError {
	/// label used for the `outcome` metric
	fn outcome(&self) -> String {
		match self {
			Self::Transport(err) if err.is_timeout() => String::from("timeout"),
			Self::Transport(_) => String::from("transport_error"),
			Self::Status(status) => status.as_str().to_owned(),
		}
	}
}

/// Something that can post a [WebhookMessage] somewhere.
#[async_trait]
pub trait WebhookSender: Send + Sync + Debug {
	/// Delivers a single message. Every call is one attempt, there are no
	/// retries.
	async fn send(&self, message: &WebhookMessage) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone)]
struct Metrics {
	deliveries: IntCounterVec,
	delivery_duration: Histogram,
}

impl Metrics {
	fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
		use prometheus::{exponential_buckets, histogram_opts, opts};

		let deliveries = IntCounterVec::new(
			opts!("deliveries_total", "total number of webhook deliveries")
				.namespace("alertmanager_discord")
				.subsystem("webhook"),
			&["outcome"],
		)?;
		registry.register(Box::new(deliveries.clone()))?;

		let delivery_duration = Histogram::with_opts(
			histogram_opts!(
				"delivery_duration_seconds",
				"total time of a webhook request in seconds",
				exponential_buckets(0.01, 2., 12)?
			)
			.namespace("alertmanager_discord")
			.subsystem("webhook"),
		)?;
		registry.register(Box::new(delivery_duration.clone()))?;

		Ok(Self { deliveries, delivery_duration })
	}

	fn record(&self, result: &Result<(), DeliveryError>) {
		let outcome = match result {
			Ok(()) => String::from("ok"),
			Err(err) => err.outcome(),
		};

		self.deliveries.with_label_values(&[outcome.as_str()]).inc();
	}
}

/// Posts messages as json to the configured webhook url.
#[derive(Debug, Clone)]
pub struct HttpWebhookSender {
	client: reqwest::Client,
	url: Url,
	metrics: Metrics,
}

impl HttpWebhookSender {
	/// # Arguments
	///
	/// * `url` - the webhook messages are posted to
	///
	/// * `timeout` - upper bound for a single delivery
	///
	/// * `registry` - where the delivery metrics get registered
	pub fn new(url: Url, timeout: Duration, registry: &Registry) -> Result<Self> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.context("failed to build http client")?;

		let metrics = Metrics::new(registry).context("failed to register webhook metrics")?;

		Ok(Self { client, url, metrics })
	}

	async fn post(&self, message: &WebhookMessage) -> Result<(), DeliveryError> {
		let response = self.client.post(self.url.clone()).json(message).send().await?;

		let status = response.status();
		if !status.is_success() {
			return Err(DeliveryError::Status(status));
		}

		Ok(())
	}
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
	async fn send(&self, message: &WebhookMessage) -> Result<(), DeliveryError> {
		let _timer = self.metrics.delivery_duration.start_timer();

		let result = self.post(message).await;
		self.metrics.record(&result);

		result
	}
}

#[cfg(test)]
mod tests {
	use axum::{
		http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
		routing::post,
		Json, Router,
	};
	use serde_json::{json, Value};
	use tokio::{net::TcpListener, sync::mpsc};

	use super::*;

	/// a captured webhook request: content type and json body
	type Captured = (Option<String>, Value);

	/// Spawns a fake chat webhook on a random local port answering every
	/// request with `status` after `delay`.
	async fn spawn_webhook(
		status: StatusCode,
		delay: Duration,
	) -> (Url, mpsc::UnboundedReceiver<Captured>) {
		let (tx, rx) = mpsc::unbounded_channel();

		let app = Router::new().route(
			"/hook",
			post(move |headers: HeaderMap, Json(body): Json<Value>| {
				let tx = tx.clone();
				async move {
					let content_type = headers
						.get(CONTENT_TYPE)
						.and_then(|value| value.to_str().ok())
						.map(str::to_owned);
					let _ = tx.send((content_type, body));

					tokio::time::sleep(delay).await;
					status
				}
			}),
		);

		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

		(Url::parse(&format!("http://{addr}/hook")).unwrap(), rx)
	}

	fn message() -> WebhookMessage {
		WebhookMessage::new("```[FIRING]: DiskFull on host1\n```".to_owned(), "AlertManager".to_owned())
	}

	fn counter(registry: &Registry, outcome: &str) -> u64 {
		registry
			.gather()
			.iter()
			.filter(|family| family.get_name() == "alertmanager_discord_webhook_deliveries_total")
			.flat_map(|family| family.get_metric())
			.filter(|metric| metric.get_label().iter().any(|label| label.get_value() == outcome))
			.map(|metric| metric.get_counter().get_value() as u64)
			.sum()
	}

	#[tokio::test]
	async fn posts_json_message() {
		let (url, mut rx) = spawn_webhook(StatusCode::NO_CONTENT, Duration::ZERO).await;
		let registry = Registry::new();
		let sender = HttpWebhookSender::new(url, Duration::from_secs(5), &registry).unwrap();

		sender.send(&message()).await.unwrap();

		let (content_type, body) = rx.recv().await.unwrap();
		assert_eq!(content_type.as_deref(), Some("application/json"));
		assert_eq!(
			body,
			json!({ "content": "```[FIRING]: DiskFull on host1\n```", "username": "AlertManager" })
		);
		assert_eq!(counter(&registry, "ok"), 1);
	}

	#[tokio::test]
	async fn non_success_status_is_an_error() {
		let (url, _rx) = spawn_webhook(StatusCode::TOO_MANY_REQUESTS, Duration::ZERO).await;
		let registry = Registry::new();
		let sender = HttpWebhookSender::new(url, Duration::from_secs(5), &registry).unwrap();

		let err = sender.send(&message()).await.unwrap_err();

		assert!(matches!(err, DeliveryError::Status(status) if status == StatusCode::TOO_MANY_REQUESTS));
		assert_eq!(counter(&registry, "429"), 1);
	}

	#[tokio::test]
	async fn slow_webhook_times_out() {
		let (url, _rx) = spawn_webhook(StatusCode::OK, Duration::from_secs(5)).await;
		let registry = Registry::new();
		let sender = HttpWebhookSender::new(url, Duration::from_millis(100), &registry).unwrap();

		let err = sender.send(&message()).await.unwrap_err();

		assert!(matches!(&err, DeliveryError::Transport(err) if err.is_timeout()));
		assert_eq!(counter(&registry, "timeout"), 1);
	}

	#[tokio::test]
	async fn unreachable_webhook_is_an_error() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		drop(listener);

		let url = Url::parse(&format!("http://{addr}/hook")).unwrap();
		let sender = HttpWebhookSender::new(url, Duration::from_secs(5), &Registry::new()).unwrap();

		assert!(matches!(sender.send(&message()).await, Err(DeliveryError::Transport(_))));
	}
}
