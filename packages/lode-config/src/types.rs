use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub source: Source,
	pub chunking: Chunking,
	#[serde(default)]
	pub runtime: Runtime,
	#[serde(default)]
	pub steps: Steps,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub qdrant: Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub summarizer: LlmProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: Option<f32>,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

/// GraphQL endpoint that lists repository trees and serves file content.
#[derive(Debug, Clone, Deserialize)]
pub struct Source {
	pub api_base: String,
	#[serde(default = "default_source_path")]
	pub path: String,
	pub api_key: Option<String>,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chunking {
	pub max_tokens: u32,
	pub overlap_tokens: u32,
	pub tokenizer_repo: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Runtime {
	pub max_concurrent_runs: u32,
	/// Optional. Whole-run deadline; a run still going after this many seconds is reported as
	/// timed out.
	pub run_timeout_secs: Option<u64>,
	/// Run the chunking step concurrently with the summary branch of an artifact run.
	pub parallel_chunking: bool,
	/// Finished runs whose status stays queryable. Older ones are forgotten first.
	pub retain_terminal_runs: u32,
}
impl Default for Runtime {
	fn default() -> Self {
		Self {
			max_concurrent_runs: 16,
			run_timeout_secs: None,
			parallel_chunking: false,
			retain_terminal_runs: 1_024,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Steps {
	pub summarize: StepPolicy,
	pub embed_summary: StepPolicy,
	pub chunk: StepPolicy,
	pub summarize_chunks: StepPolicy,
	pub embed_chunk_summaries: StepPolicy,
	pub index: StepPolicy,
	pub list: StepPolicy,
	pub fetch: StepPolicy,
}
impl Default for Steps {
	fn default() -> Self {
		Self {
			summarize: StepPolicy::with_timeout(60_000),
			embed_summary: StepPolicy::with_timeout(60_000),
			chunk: StepPolicy::with_timeout(30_000),
			summarize_chunks: StepPolicy::with_timeout(120_000),
			embed_chunk_summaries: StepPolicy::with_timeout(60_000),
			index: StepPolicy::with_timeout(60_000),
			list: StepPolicy::with_timeout(30_000),
			fetch: StepPolicy::with_timeout(30_000),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepPolicy {
	pub timeout_ms: u64,
	pub max_attempts: u32,
	pub initial_interval_ms: u64,
	pub max_interval_ms: u64,
}
impl StepPolicy {
	pub fn with_timeout(timeout_ms: u64) -> Self {
		Self { timeout_ms, max_attempts: 3, initial_interval_ms: 1_000, max_interval_ms: 10_000 }
	}
}

fn default_source_path() -> String {
	"/graphql".to_string()
}
