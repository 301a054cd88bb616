//! Groups alerts by status and renders every group into one chat message.
//!
//! Alerts are received from [alertmanager_webhook_receiver](crate::alertmanager_webhook_receiver)
//! Rendered messages are delivered by [relay](crate::relay)

use indexmap::IndexMap;

use crate::{
	alert::{Alert, Batch},
	webhook_message::WebhookMessage,
};

/// opens and closes the preformatted block around the alert lines
const CODE_FENCE: &str = "```";

/// alerts of one batch keyed by status. Statuses keep the order of their first
/// occurrence, alerts keep the order they were received in.
pub type GroupedAlerts<'a> = IndexMap<&'a str, Vec<&'a Alert>>;

/// Groups the alerts of a batch by their status.
pub fn group_by_status(alerts: &[Alert]) -> GroupedAlerts<'_> {
	let mut groups = GroupedAlerts::new();

	for alert in alerts {
		groups.entry(alert.status()).or_default().push(alert);
	}

	groups
}

/// Alert renderer
#[derive(Debug, Clone)]
pub struct AlertRenderer {
	bot_name: String,
}

impl AlertRenderer {
	/// Return new renderer
	///
	/// * `bot_name` - display name used as `username` of every message
	pub fn new(bot_name: impl Into<String>) -> Self {
		Self { bot_name: bot_name.into() }
	}

	/// Renders a whole batch, one [WebhookMessage] per status group.
	pub fn render_batch<'a>(&self, batch: &'a Batch) -> Vec<RenderedGroup<'a>> {
		group_by_status(batch.alerts())
			.into_iter()
			.map(|(status, alerts)| RenderedGroup {
				status,
				alert_count: alerts.len(),
				message: self.render_group(batch.common_summary(), status, &alerts),
			})
			.collect()
	}

	/// Renders the alerts of one status group.
	///
	/// # Arguments
	///
	/// * `summary` - shared summary of the batch, printed as header if non-empty
	///
	/// * `status` - status of the group
	///
	/// * `alerts` - the alerts of the group in received order
	pub fn render_group(&self, summary: &str, status: &str, alerts: &[&Alert]) -> WebhookMessage {
		let mut content = String::new();

		if !summary.is_empty() {
			content.push_str(&format!(" === {summary} === \n"));
		}
		content.push_str(CODE_FENCE);

		let status = status.to_uppercase();
		for alert in alerts {
			content.push_str(&format!(
				"[{status}]: {} on {}\n{}\n",
				alert.alertname(),
				alert.instance(),
				alert.description()
			));

			let severity = alert.severity();
			if !severity.is_empty() {
				content.push_str(&format!("Severity: {severity}\n\n"));
			}
		}

		content.push_str(CODE_FENCE);

		WebhookMessage::new(content, self.bot_name.clone())
	}
}

/// rendered message of one status group together with what it contains
#[derive(Debug, Clone)]
pub struct RenderedGroup<'a> {
	pub status: &'a str,
	pub alert_count: usize,
	pub message: WebhookMessage,
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;
	use crate::alert::{decode, LabelSet};

	fn alert(status: &str, name: &str, instance: &str, severity: Option<&str>) -> Alert {
		let mut labels = vec![("alertname", name), ("instance", instance)];
		if let Some(severity) = severity {
			labels.push(("severity", severity));
		}

		let annotations = [("description", format!("{name} on {instance} is broken"))];

		Alert::new(
			status,
			labels.into_iter().collect(),
			annotations.into_iter().collect::<LabelSet>(),
		)
	}

	#[test]
	fn renders_scenario_without_severity() {
		let batch = decode(
			br#"{
				"commonAnnotations": {"summary": "db down"},
				"alerts": [{
					"status": "firing",
					"labels": {"alertname": "DiskFull", "instance": "host1"},
					"annotations": {"description": "disk at 95%"}
				}]
			}"#,
		)
		.unwrap();

		let rendered = AlertRenderer::new("AlertManager").render_batch(&batch);

		assert_eq!(rendered.len(), 1);
		let group = &rendered[0];
		assert_eq!(group.status, "firing");
		assert_eq!(group.alert_count, 1);
		assert_eq!(group.message.username(), "AlertManager");

		let content = group.message.content();
		assert!(content.contains("=== db down ==="));
		assert!(content.contains("[FIRING]: DiskFull on host1"));
		assert!(content.contains("disk at 95%"));
		assert!(!content.contains("Severity:"));
		assert_eq!(content, " === db down === \n```[FIRING]: DiskFull on host1\ndisk at 95%\n```");
	}

	#[test]
	fn renders_severity_and_omits_empty_header() {
		let renderer = AlertRenderer::new("bot");
		let first = alert("firing", "DiskFull", "host1", Some("critical"));
		let second = alert("firing", "HighLoad", "host2", None);

		let message = renderer.render_group("", "firing", &[&first, &second]);

		assert_eq!(
			message.content(),
			"```[FIRING]: DiskFull on host1\nDiskFull on host1 is broken\nSeverity: critical\n\n\
			 [FIRING]: HighLoad on host2\nHighLoad on host2 is broken\n```"
		);
		assert_eq!(message.content().matches("Severity:").count(), 1);
	}

	#[test]
	fn empty_group_is_a_closed_block() {
		let message = AlertRenderer::new("bot").render_group("", "firing", &[]);

		assert_eq!(message.content(), "``````");
	}

	#[test]
	fn empty_batch_renders_nothing() {
		let batch = decode(br#"{"alerts": [], "commonAnnotations": {"summary": "db down"}}"#).unwrap();

		assert!(AlertRenderer::new("bot").render_batch(&batch).is_empty());
	}

	#[test]
	fn splits_firing_and_resolved() {
		let alerts = vec![
			alert("firing", "DiskFull", "host1", None),
			alert("resolved", "HighLoad", "host2", None),
			alert("firing", "DiskFull", "host3", None),
		];

		let groups = group_by_status(&alerts);

		assert_eq!(groups.keys().copied().collect::<Vec<_>>(), vec!["firing", "resolved"]);
		assert_eq!(
			groups["firing"].iter().map(|a| a.instance()).collect::<Vec<_>>(),
			vec!["host1", "host3"]
		);
		assert_eq!(groups["resolved"].len(), 1);

		let renderer = AlertRenderer::new("bot");
		let resolved = renderer.render_group("", "resolved", &groups["resolved"]);
		assert!(resolved.content().contains("[RESOLVED]: HighLoad on host2"));
		assert!(!resolved.content().contains("DiskFull"));
	}

	fn arb_alert() -> impl Strategy<Value = Alert> {
		(
			prop::sample::select(vec!["firing", "resolved", "pending", "suppressed"]),
			"[a-z]{1,8}",
			"[a-z0-9]{1,8}",
			prop::option::of("[a-z]{1,8}"),
		)
			.prop_map(|(status, name, instance, severity)| {
				alert(status, &name, &instance, severity.as_deref())
			})
	}

	proptest! {
		#[test]
		fn one_group_per_distinct_status(alerts in prop::collection::vec(arb_alert(), 0..32)) {
			let mut statuses: Vec<&str> = alerts.iter().map(Alert::status).collect();
			statuses.sort_unstable();
			statuses.dedup();

			let groups = group_by_status(&alerts);
			prop_assert_eq!(groups.len(), statuses.len());
			prop_assert_eq!(groups.values().map(Vec::len).sum::<usize>(), alerts.len());
		}

		#[test]
		fn grouping_preserves_relative_order(alerts in prop::collection::vec(arb_alert(), 0..32)) {
			for (status, group) in group_by_status(&alerts) {
				let expected: Vec<*const Alert> = alerts
					.iter()
					.filter(|alert| alert.status() == status)
					.map(|alert| alert as *const Alert)
					.collect();
				let actual: Vec<*const Alert> = group.iter().map(|alert| *alert as *const Alert).collect();

				prop_assert_eq!(actual, expected);
			}
		}

		#[test]
		fn one_severity_line_per_alert_with_severity(alerts in prop::collection::vec(arb_alert(), 1..16)) {
			let renderer = AlertRenderer::new("bot");

			for (status, group) in group_by_status(&alerts) {
				let message = renderer.render_group("summary", status, &group);
				let expected = group.iter().filter(|alert| !alert.severity().is_empty()).count();

				prop_assert_eq!(message.content().matches("Severity: ").count(), expected);
			}
		}

		#[test]
		fn rendering_is_deterministic(alerts in prop::collection::vec(arb_alert(), 0..16)) {
			let renderer = AlertRenderer::new("bot");
			let groups = group_by_status(&alerts);

			for (status, group) in &groups {
				prop_assert_eq!(
					renderer.render_group("db down", status, group),
					renderer.render_group("db down", status, group)
				);
			}
		}
	}
}
