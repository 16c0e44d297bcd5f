mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Chunking, Config, EmbeddingProviderConfig, LlmProviderConfig, Providers, Qdrant, Runtime,
	Service, Source, StepPolicy, Steps, Storage,
};

use std::{fs, path::Path};

use lode_domain::EMBEDDING_DIM;

const MAX_LOCAL_STEP_TIMEOUT_MS: u64 = 30_000;
const MIN_REMOTE_STEP_TIMEOUT_MS: u64 = 60_000;
const MAX_REMOTE_STEP_TIMEOUT_MS: u64 = 180_000;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.collection must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.vector_dim as usize != EMBEDDING_DIM {
		return Err(Error::Validation {
			message: format!("storage.qdrant.vector_dim must be {EMBEDDING_DIM}."),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("summarizer", &cfg.providers.summarizer.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	if let Some(temperature) = cfg.providers.summarizer.temperature
		&& !(0.0..=2.0).contains(&temperature)
	{
		return Err(Error::Validation {
			message: "providers.summarizer.temperature must be in the range 0.0-2.0.".to_string(),
		});
	}
	if cfg.source.api_base.trim().is_empty() {
		return Err(Error::Validation {
			message: "source.api_base must be non-empty.".to_string(),
		});
	}
	if cfg.chunking.max_tokens == 0 {
		return Err(Error::Validation {
			message: "chunking.max_tokens must be greater than zero.".to_string(),
		});
	}
	if cfg.chunking.overlap_tokens >= cfg.chunking.max_tokens {
		return Err(Error::Validation {
			message: "chunking.overlap_tokens must be less than chunking.max_tokens.".to_string(),
		});
	}
	if cfg.runtime.max_concurrent_runs == 0 {
		return Err(Error::Validation {
			message: "runtime.max_concurrent_runs must be greater than zero.".to_string(),
		});
	}

	if cfg.runtime.retain_terminal_runs == 0 {
		return Err(Error::Validation {
			message: "runtime.retain_terminal_runs must be greater than zero.".to_string(),
		});
	}

	if let Some(secs) = cfg.runtime.run_timeout_secs
		&& secs == 0
	{
		return Err(Error::Validation {
			message: "runtime.run_timeout_secs must be greater than zero.".to_string(),
		});
	}

	let steps = &cfg.steps;

	for (label, policy) in [
		("steps.chunk", &steps.chunk),
		("steps.list", &steps.list),
		("steps.fetch", &steps.fetch),
	] {
		validate_step(label, policy)?;

		if policy.timeout_ms > MAX_LOCAL_STEP_TIMEOUT_MS {
			return Err(Error::Validation {
				message: format!(
					"{label}.timeout_ms must be at most {MAX_LOCAL_STEP_TIMEOUT_MS} milliseconds."
				),
			});
		}
	}
	for (label, policy) in [
		("steps.summarize", &steps.summarize),
		("steps.embed_summary", &steps.embed_summary),
		("steps.summarize_chunks", &steps.summarize_chunks),
		("steps.embed_chunk_summaries", &steps.embed_chunk_summaries),
		("steps.index", &steps.index),
	] {
		validate_step(label, policy)?;

		if !(MIN_REMOTE_STEP_TIMEOUT_MS..=MAX_REMOTE_STEP_TIMEOUT_MS).contains(&policy.timeout_ms) {
			return Err(Error::Validation {
				message: format!(
					"{label}.timeout_ms must be in the range {MIN_REMOTE_STEP_TIMEOUT_MS}-{MAX_REMOTE_STEP_TIMEOUT_MS} milliseconds."
				),
			});
		}
	}

	Ok(())
}

fn validate_step(label: &str, policy: &StepPolicy) -> Result<()> {
	if policy.timeout_ms == 0 {
		return Err(Error::Validation {
			message: format!("{label}.timeout_ms must be greater than zero."),
		});
	}
	if policy.max_attempts == 0 {
		return Err(Error::Validation {
			message: format!("{label}.max_attempts must be at least 1."),
		});
	}
	if policy.initial_interval_ms > policy.max_interval_ms {
		return Err(Error::Validation {
			message: format!("{label}.initial_interval_ms must not exceed max_interval_ms."),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.chunking.tokenizer_repo.as_deref().map(|repo| repo.trim().is_empty()).unwrap_or(false) {
		cfg.chunking.tokenizer_repo = None;
	}
	if cfg.source.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
		cfg.source.api_key = None;
	}

	let api_base = cfg.source.api_base.trim_end_matches('/').to_string();

	cfg.source.api_base = api_base;
}
