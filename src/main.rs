//! prometheus alertmanager receiver that forwards alerts to a chat webhook
//!
//! Features:
//! - groups the alerts of every notification by status (firing, resolved, ...)
//! - posts one formatted message per status group to a discord compatible
//!   webhook
//! - optional prometheus metrics endpoint
use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::Registry;
use tokio::sync::watch;

use crate::{
	alert_renderer::AlertRenderer,
	alertmanager_webhook_receiver::ReceiverState,
	relay::Relay,
	settings::Settings,
	webhook_sender::HttpWebhookSender,
};

mod alert;
mod alert_renderer;
mod alertmanager_webhook_receiver;
mod log;
mod relay;
mod settings;
mod telemetry_endpoint;
mod webhook_message;
mod webhook_sender;

/// exit the complete program if one thread panics
fn setup_panic_handler() {
	let default_panic = std::panic::take_hook();
	std::panic::set_hook(Box::new(move |info| {
		default_panic(info);
		std::process::exit(1);
	}));
}

/// resolves once ctrl-c was received, never if the signal can't be listened for
async fn shutdown_signal(mut rx: watch::Receiver<bool>) {
	if rx.changed().await.is_err() {
		std::future::pending::<()>().await;
	}
}

/// the entry point of the program
#[tokio::main]
pub async fn main() -> Result<()> {
	setup_panic_handler();

	// nothing binds before the settings are validated
	let settings = match Settings::load() {
		Ok(settings) => settings,
		Err(err) => {
			// tracing wasn't setup yet
			eprintln!("error: {err}");
			std::process::exit(1);
		}
	};

	log::setup_logging(settings.log_level).context("could not setup logging")?;

	let registry = Registry::new();

	let sender = HttpWebhookSender::new(
		settings.webhook_url.clone(),
		settings.delivery_timeout,
		&registry,
	)
	.context("failed to construct webhook sender")?;

	let relay = Relay::new(AlertRenderer::new(settings.bot_name.as_str()), Arc::new(sender));
	let state = ReceiverState::new(relay, settings.verbose, &registry)
		.context("failed to construct alertmanager receiver")?;

	let (tx_shutdown, rx_shutdown) = watch::channel(false);
	tokio::spawn(async move {
		if let Err(err) = tokio::signal::ctrl_c().await {
			tracing::error!("failed to listen for ctrl-c: {err}");
			return;
		}
		tracing::info!("shutting down");
		let _ = tx_shutdown.send(true);
	});

	if let Some(addr) = settings.telemetry_address {
		let shutdown = shutdown_signal(rx_shutdown.clone());
		tokio::spawn(async move {
			#[allow(clippy::expect_used)]
			telemetry_endpoint::run_telemetry_endpoint(registry, addr, shutdown)
				.await
				.expect("telemetry endpoint failed to start or crashed");
		});
	}

	alertmanager_webhook_receiver::run_alertmanager_receiver(
		Arc::new(state),
		settings.address,
		shutdown_signal(rx_shutdown),
	)
	.await
	.context("alertmanager webhook receiver failed")?;

	Ok(())
}
