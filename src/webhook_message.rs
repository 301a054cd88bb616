//! the document posted to the chat webhook

use serde::Serialize;

/// One rendered status group, ready to be posted to the webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookMessage {
	/// rendered message text
	content: String,
	/// display name of the bot posting the message
	username: String,
}

impl WebhookMessage {
	/// construct WebhookMessage
	pub fn new(content: String, username: String) -> Self {
		Self { content, username }
	}

	pub fn content(&self) -> &str {
		&self.content
	}

	pub fn username(&self) -> &str {
		&self.username
	}
}
