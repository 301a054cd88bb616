//! data structures for deserializing incoming alerts
use std::collections::HashMap;

use serde::Deserialize;
use serde_with::{serde_as, DefaultOnNull};
use thiserror::Error;

/// Error returned when a request body isn't an alertmanager notification
#[derive(Error, Debug)]
#[error("malformed alertmanager payload: {0}")]
pub struct MalformedPayload(#[from] serde_json::Error);

/// Decodes the raw body of an alertmanager webhook request.
///
/// Unknown fields are ignored, missing fields and `null`s fall back to empty
/// strings, maps and sequences.
pub fn decode(body: &[u8]) -> Result<Batch, MalformedPayload> {
	Ok(serde_json::from_slice(body)?)
}

/// label or annotation set of an alert. Absent keys read as empty string.
#[serde_as]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct LabelSet(#[serde_as(as = "HashMap<_, DefaultOnNull>")] HashMap<String, String>);

impl LabelSet {
	/// value for `key`, or `""` if the key isn't set
	pub fn get(&self, key: &str) -> &str {
		self.0.get(key).map_or("", String::as_str)
	}
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
	}
}

#[serde_as]
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// data from prometheus received by the alertmanager webhook receiver
#[allow(clippy::missing_docs_in_private_items)]
pub struct Batch {
	#[serde_as(as = "DefaultOnNull")]
	version: String,
	#[serde_as(as = "DefaultOnNull")]
	group_key: String,

	#[serde_as(as = "DefaultOnNull")]
	receiver: String,
	#[serde_as(as = "DefaultOnNull")]
	status: String,
	#[serde_as(as = "DefaultOnNull")]
	alerts: Vec<Alert>,
	#[serde_as(as = "DefaultOnNull")]
	group_labels: LabelSet,
	#[serde_as(as = "DefaultOnNull")]
	common_labels: LabelSet,
	#[serde_as(as = "DefaultOnNull")]
	common_annotations: LabelSet,
	#[serde(rename = "externalURL")]
	#[serde_as(as = "DefaultOnNull")]
	external_url: String,
}

impl Batch {
	pub fn alerts(&self) -> &[Alert] {
		&self.alerts
	}

	/// `summary` annotation shared by all alerts of the batch
	pub fn common_summary(&self) -> &str {
		self.common_annotations.get("summary")
	}

	pub fn version(&self) -> &str {
		&self.version
	}

	pub fn group_key(&self) -> &str {
		&self.group_key
	}

	pub fn receiver(&self) -> &str {
		&self.receiver
	}

	/// overall status of the notification
	pub fn status(&self) -> &str {
		&self.status
	}

	pub fn group_labels(&self) -> &LabelSet {
		&self.group_labels
	}

	pub fn common_labels(&self) -> &LabelSet {
		&self.common_labels
	}

	pub fn external_url(&self) -> &str {
		&self.external_url
	}
}

#[serde_as]
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(clippy::missing_docs_in_private_items)]
pub struct Alert {
	#[serde_as(as = "DefaultOnNull")]
	status: String,
	#[serde_as(as = "DefaultOnNull")]
	labels: LabelSet,
	#[serde_as(as = "DefaultOnNull")]
	annotations: LabelSet,
}

impl Alert {
	#[cfg(test)]
	pub fn new(status: impl Into<String>, labels: LabelSet, annotations: LabelSet) -> Self {
		Self { status: status.into(), labels, annotations }
	}

	/// status of the alert, e.g. `firing` or `resolved`
	pub fn status(&self) -> &str {
		&self.status
	}

	pub fn alertname(&self) -> &str {
		self.labels.get("alertname")
	}

	pub fn instance(&self) -> &str {
		self.labels.get("instance")
	}

	pub fn severity(&self) -> &str {
		self.labels.get("severity")
	}

	pub fn description(&self) -> &str {
		self.annotations.get("description")
	}
}
