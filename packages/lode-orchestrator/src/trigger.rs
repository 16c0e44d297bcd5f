//! Maps bus events onto start requests.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use lode_domain::Artifact;

use crate::{Error, LaunchOutcome, ProcessLauncher, StartRequest};

pub const SNIPPET_CREATED_TOPIC: &str = "snippet.created";
pub const SNIPPET_UPDATED_TOPIC: &str = "snippet.updated";
pub const REPOSITORY_CLONED_TOPIC: &str = "repository.cloned";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
	pub topic: String,
	#[serde(default)]
	pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriggerOutcome {
	Started { run_id: String },
	AlreadyRunning { run_id: String },
	/// The topic starts nothing.
	Ignored { topic: String },
}

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
	#[error("Invalid {topic} payload: {message}")]
	InvalidPayload { topic: String, message: String },
	#[error(transparent)]
	Launch(#[from] Error),
}

/// Start request for `event`, or `None` when its topic starts nothing.
pub fn start_request_for(event: &TriggerEvent) -> Result<Option<StartRequest>, TriggerError> {
	let invalid = |message: &str| TriggerError::InvalidPayload {
		topic: event.topic.clone(),
		message: message.to_string(),
	};

	match event.topic.as_str() {
		SNIPPET_CREATED_TOPIC | SNIPPET_UPDATED_TOPIC => {
			let id = string_field(&event.payload, "id")
				.ok_or_else(|| invalid("id must be a non-empty string or number."))?;
			let code = event
				.payload
				.get("code")
				.and_then(Value::as_str)
				.ok_or_else(|| invalid("code must be a string."))?;

			Ok(Some(StartRequest::Artifact(Artifact::new(id, code))))
		},
		REPOSITORY_CLONED_TOPIC => {
			let owner = string_field(&event.payload, "identifier")
				.or_else(|| string_field(&event.payload, "id"))
				.ok_or_else(|| invalid("identifier must be a non-empty string or number."))?;

			Ok(Some(StartRequest::Crawl { owner }))
		},
		_ => Ok(None),
	}
}

fn string_field(payload: &Value, key: &str) -> Option<String> {
	match payload.get(key)? {
		Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
		Value::Number(number) => Some(number.to_string()),
		_ => None,
	}
}

/// Entry point for external events. Each accepted event starts one run with a deterministic
/// identity; repeats while that run is in flight start nothing.
pub struct TriggerListener {
	launcher: Arc<dyn ProcessLauncher>,
}
impl TriggerListener {
	pub fn new(launcher: Arc<dyn ProcessLauncher>) -> Self {
		Self { launcher }
	}

	pub async fn handle(&self, event: &TriggerEvent) -> Result<TriggerOutcome, TriggerError> {
		let Some(request) = start_request_for(event)? else {
			tracing::debug!(topic = %event.topic, "Event topic ignored.");

			return Ok(TriggerOutcome::Ignored { topic: event.topic.clone() });
		};

		Ok(match self.launcher.launch(request).await? {
			LaunchOutcome::Started { run_id } => TriggerOutcome::Started { run_id },
			LaunchOutcome::AlreadyRunning { run_id } => TriggerOutcome::AlreadyRunning { run_id },
		})
	}
}
