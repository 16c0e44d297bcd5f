use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use lode_config::{Config, Error};

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_value() -> Value {
	toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.")
}

fn set_key(value: &mut Value, path: &[&str], new_value: Value) {
	let (last, parents) = path.split_last().expect("Key path must be non-empty.");
	let mut table = value.as_table_mut().expect("Template config must be a table.");

	for parent in parents {
		let entry = table
			.entry(parent.to_string())
			.or_insert_with(|| Value::Table(toml::map::Map::new()));

		table = entry.as_table_mut().expect("Parent key must be a table.");
	}

	table.insert(last.to_string(), new_value);
}

fn render(value: &Value) -> String {
	toml::to_string(value).expect("Failed to render template config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("lode_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_value(value: &Value) -> lode_config::Result<Config> {
	let path = write_temp_config(render(value));
	let result = lode_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

fn expect_validation(value: &Value, needle: &str) {
	let err = load_value(value).expect_err("Expected validation error.");

	assert!(matches!(err, Error::Validation { .. }), "Unexpected error kind: {err:?}");

	let message = err.to_string();

	assert!(message.contains(needle), "Unexpected error message: {message}");
}

#[test]
fn sample_config_loads_with_step_defaults() {
	let cfg = load_value(&sample_value()).expect("Sample config must load.");

	assert_eq!(cfg.storage.qdrant.vector_dim, 1024);
	assert_eq!(cfg.steps.summarize.timeout_ms, 60_000);
	assert_eq!(cfg.steps.chunk.timeout_ms, 30_000);
	assert_eq!(cfg.steps.summarize_chunks.timeout_ms, 120_000);
	assert_eq!(cfg.steps.fetch.max_attempts, 3);
	assert_eq!(cfg.steps.list.initial_interval_ms, 1_000);
	assert_eq!(cfg.steps.index.max_interval_ms, 10_000);
	assert_eq!(cfg.runtime.max_concurrent_runs, 8);
	assert_eq!(cfg.runtime.run_timeout_secs, None);
	assert_eq!(cfg.runtime.retain_terminal_runs, 1_024);
}

#[test]
fn blank_optional_strings_are_normalized() {
	let cfg = load_value(&sample_value()).expect("Sample config must load.");

	assert!(cfg.chunking.tokenizer_repo.is_none());
	assert!(cfg.source.api_key.is_none());
	assert_eq!(cfg.source.api_base, "http://127.0.0.1:8080");
	assert_eq!(cfg.source.path, "/graphql");
}

#[test]
fn vector_dim_must_be_the_system_dimension() {
	let mut value = sample_value();

	set_key(&mut value, &["storage", "qdrant", "vector_dim"], Value::Integer(768));
	set_key(&mut value, &["providers", "embedding", "dimensions"], Value::Integer(768));

	expect_validation(&value, "storage.qdrant.vector_dim must be 1024.");
}

#[test]
fn embedding_dimensions_must_match_vector_dim() {
	let mut value = sample_value();

	set_key(&mut value, &["providers", "embedding", "dimensions"], Value::Integer(512));

	expect_validation(
		&value,
		"providers.embedding.dimensions must match storage.qdrant.vector_dim.",
	);
}

#[test]
fn provider_api_keys_must_be_non_empty() {
	let mut value = sample_value();

	set_key(&mut value, &["providers", "summarizer", "api_key"], Value::String("  ".to_string()));

	expect_validation(&value, "Provider summarizer api_key must be non-empty.");
}

#[test]
fn overlap_must_be_less_than_max_tokens() {
	let mut value = sample_value();

	set_key(&mut value, &["chunking", "overlap_tokens"], Value::Integer(512));

	expect_validation(&value, "chunking.overlap_tokens must be less than chunking.max_tokens.");
}

#[test]
fn local_steps_are_capped_at_thirty_seconds() {
	let mut value = sample_value();
	let mut policy = toml::map::Map::new();

	policy.insert("timeout_ms".to_string(), Value::Integer(45_000));
	policy.insert("max_attempts".to_string(), Value::Integer(3));
	policy.insert("initial_interval_ms".to_string(), Value::Integer(1_000));
	policy.insert("max_interval_ms".to_string(), Value::Integer(10_000));
	set_key(&mut value, &["steps", "list"], Value::Table(policy));

	expect_validation(&value, "steps.list.timeout_ms must be at most 30000 milliseconds.");
}

#[test]
fn remote_steps_must_allow_for_model_latency() {
	let mut value = sample_value();

	set_key(&mut value, &["steps", "summarize_chunks", "timeout_ms"], Value::Integer(5_000));

	expect_validation(&value, "steps.summarize_chunks.timeout_ms must be in the range");
}

#[test]
fn step_attempts_must_be_positive() {
	let mut value = sample_value();

	set_key(&mut value, &["steps", "summarize_chunks", "max_attempts"], Value::Integer(0));

	expect_validation(&value, "steps.summarize_chunks.max_attempts must be at least 1.");
}

#[test]
fn backoff_interval_bounds_are_ordered() {
	let mut value = sample_value();

	set_key(
		&mut value,
		&["steps", "summarize_chunks", "initial_interval_ms"],
		Value::Integer(20_000),
	);

	expect_validation(
		&value,
		"steps.summarize_chunks.initial_interval_ms must not exceed max_interval_ms.",
	);
}

#[test]
fn run_timeout_must_be_positive_when_set() {
	let mut value = sample_value();

	set_key(&mut value, &["runtime", "run_timeout_secs"], Value::Integer(0));

	expect_validation(&value, "runtime.run_timeout_secs must be greater than zero.");
}

#[test]
fn terminal_run_retention_must_be_positive() {
	let mut value = sample_value();

	set_key(&mut value, &["runtime", "retain_terminal_runs"], Value::Integer(0));

	expect_validation(&value, "runtime.retain_terminal_runs must be greater than zero.");
}

#[test]
fn missing_file_reports_read_error() {
	let path = env::temp_dir().join("lode_config_test_missing.toml");
	let err = lode_config::load(&path).expect_err("Expected read error.");

	assert!(matches!(err, Error::ReadConfig { .. }));
}
