use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::{Error, Result};

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
	data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
	index: Option<usize>,
	embedding: Vec<f32>,
}

/// Embeds every text in one request. Vectors come back in input order.
pub async fn embed(
	cfg: &lode_config::EmbeddingProviderConfig,
	texts: &[String],
) -> Result<Vec<Vec<f32>>> {
	if texts.is_empty() {
		return Ok(Vec::new());
	}

	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let body = serde_json::json!({
		"model": cfg.model,
		"input": texts,
		"dimensions": cfg.dimensions,
	});
	let json: Value = client
		.post(format!("{}{}", cfg.api_base, cfg.path))
		.headers(crate::auth_headers(Some(&cfg.api_key), &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?
		.error_for_status()?
		.json()
		.await?;
	let vectors = parse_embedding_response(json)?;

	if vectors.len() != texts.len() {
		return Err(Error::InvalidResponse {
			message: format!("Got {} embeddings for {} inputs.", vectors.len(), texts.len()),
		});
	}

	Ok(vectors)
}

/// Items without an `index` keep their position in `data`.
fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let response: EmbeddingResponse = serde_json::from_value(json).map_err(|err| {
		Error::InvalidResponse { message: format!("Malformed embedding response: {err}.") }
	})?;
	let mut indexed = response
		.data
		.into_iter()
		.enumerate()
		.map(|(position, item)| (item.index.unwrap_or(position), item.embedding))
		.collect::<Vec<_>>();

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, embedding)| embedding).collect())
}
