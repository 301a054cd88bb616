//! Relays a decoded alert batch to the chat webhook, one message per status
//! group.

use std::sync::Arc;

use futures::future::join_all;

use crate::{
	alert::Batch,
	alert_renderer::{AlertRenderer, RenderedGroup},
	webhook_sender::WebhookSender,
};

/// outcome of relaying one batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayReport {
	/// number of messages the webhook accepted
	pub delivered: usize,
	/// number of messages that couldn't be delivered
	pub failed: usize,
}

/// Stateless relay shared between all requests.
#[derive(Debug, Clone)]
pub struct Relay {
	renderer: AlertRenderer,
	sender: Arc<dyn WebhookSender>,
}

impl Relay {
	pub fn new(renderer: AlertRenderer, sender: Arc<dyn WebhookSender>) -> Self {
		Self { renderer, sender }
	}

	/// Renders every status group of `batch` and delivers the messages
	/// concurrently. A failed delivery is logged and doesn't affect the other
	/// groups.
	pub async fn relay(&self, batch: &Batch) -> RelayReport {
		tracing::debug!(
			version = batch.version(),
			group_key = batch.group_key(),
			receiver = batch.receiver(),
			status = batch.status(),
			group_labels = ?batch.group_labels(),
			common_labels = ?batch.common_labels(),
			external_url = batch.external_url(),
			alerts = batch.alerts().len(),
			"relaying alert batch"
		);

		let groups = self.renderer.render_batch(batch);
		let results = join_all(groups.iter().map(|group| self.deliver(group))).await;

		results.into_iter().fold(RelayReport::default(), |mut report, delivered| {
			if delivered {
				report.delivered += 1;
			} else {
				report.failed += 1;
			}
			report
		})
	}

	async fn deliver(&self, group: &RenderedGroup<'_>) -> bool {
		match self.sender.send(&group.message).await {
			Ok(()) => {
				tracing::debug!(
					status = group.status,
					alerts = group.alert_count,
					"delivered alert group"
				);
				true
			}
			Err(err) => {
				tracing::warn!(
					status = group.status,
					alerts = group.alert_count,
					"failed to deliver alert group: {err}"
				);
				false
			}
		}
	}
}
