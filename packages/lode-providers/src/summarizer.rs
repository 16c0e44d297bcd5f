use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

const SNIPPET_SYSTEM_PROMPT: &str = "You are an expert software engineer. Summarize what the given code does in a few sentences. Mention its purpose, its inputs and outputs, and any notable side effects. Reply with the summary only.";
const CHUNK_SYSTEM_PROMPT: &str = "You are an expert software engineer. You are given one part of a larger source file. Summarize what this part does in one or two sentences. Reply with the summary only.";

/// Produces a natural-language summary of a whole snippet.
pub async fn summarize(cfg: &lode_config::LlmProviderConfig, code: &str) -> Result<String> {
	let messages = vec![
		serde_json::json!({ "role": "system", "content": SNIPPET_SYSTEM_PROMPT }),
		serde_json::json!({ "role": "user", "content": code }),
	];

	complete(cfg, &messages).await
}

/// Summarizes one chunk. `index` is zero-based; the prompt labels parts from one.
pub async fn summarize_chunk(
	cfg: &lode_config::LlmProviderConfig,
	index: usize,
	chunk: &str,
) -> Result<String> {
	let messages = vec![
		serde_json::json!({ "role": "system", "content": CHUNK_SYSTEM_PROMPT }),
		serde_json::json!({
			"role": "user",
			"content": format!("Code (part {}):\n{chunk}", index + 1),
		}),
	];

	complete(cfg, &messages).await
}

async fn complete(cfg: &lode_config::LlmProviderConfig, messages: &[Value]) -> Result<String> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": messages,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(Some(&cfg.api_key), &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_completion(json)
}

fn parse_completion(json: Value) -> Result<String> {
	let content = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Completion response is missing message content.".to_string(),
		})?;
	let summary = content.trim();

	if summary.is_empty() {
		// Models occasionally return an empty message under load.
		return Err(Error::Upstream { message: "Completion content is empty.".to_string() });
	}

	Ok(summary.to_string())
}
