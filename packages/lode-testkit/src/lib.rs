pub mod fakes;

mod error;

pub use error::{Error, Result};
pub use fakes::{
	CountSkew, FailureScript, FakeChunker, FakeEmbedder, FakeSummarizer, FakeTree, Fakes, Gate,
	MemoryStore, embedding_for, stored_document,
};

use std::{env, thread, time::Duration};

use qdrant_client::Qdrant;
use tokio::{runtime::Builder, time};
use uuid::Uuid;

use lode_orchestrator::{RetryPolicy, StepConfig, StepTable};

pub fn env_qdrant_url() -> Option<String> {
	env::var("LODE_QDRANT_URL").ok()
}

/// Step settings for tests: generous timeouts, three attempts and millisecond backoff.
pub fn fast_steps() -> StepTable {
	steps_with(StepConfig {
		timeout: Duration::from_secs(5),
		retry: RetryPolicy {
			max_attempts: 3,
			initial_interval: Duration::from_millis(1),
			max_interval: Duration::from_millis(4),
		},
	})
}

pub fn steps_with(config: StepConfig) -> StepTable {
	StepTable {
		summarize: config,
		embed_summary: config,
		chunk: config,
		summarize_chunks: config,
		embed_chunk_summaries: config,
		index: config,
		list: config,
		fetch: config,
	}
}

/// A uniquely named Qdrant collection that is deleted on cleanup or drop.
pub struct TestCollection {
	url: String,
	name: String,
	cleaned: bool,
}
impl TestCollection {
	pub fn new(url: &str, prefix: &str) -> Self {
		Self {
			url: url.to_string(),
			name: format!("{prefix}_{}", Uuid::new_v4().simple()),
			cleaned: false,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub async fn cleanup(mut self) -> Result<()> {
		delete_collection(&self.url, &self.name).await?;

		self.cleaned = true;

		Ok(())
	}
}
impl Drop for TestCollection {
	fn drop(&mut self) {
		if self.cleaned {
			return;
		}

		let url = self.url.clone();
		let name = self.name.clone();
		let cleanup_thread = thread::spawn(move || {
			let runtime = match Builder::new_current_thread().enable_all().build() {
				Ok(runtime) => runtime,
				Err(err) => {
					eprintln!("Test Qdrant cleanup failed: {err}.");

					return;
				},
			};

			if let Err(err) = runtime.block_on(delete_collection(&url, &name)) {
				eprintln!("Test Qdrant cleanup failed: {err}.");
			}
		});
		let _ = cleanup_thread.join();
	}
}

async fn delete_collection(url: &str, name: &str) -> Result<()> {
	const LIMIT: Duration = Duration::from_secs(10);

	let timed_out = |operation| Error::Timeout {
		operation,
		collection: name.to_string(),
		secs: LIMIT.as_secs(),
	};
	let client = Qdrant::from_url(url).build()?;
	let exists = time::timeout(LIMIT, client.collection_exists(name.to_string()))
		.await
		.map_err(|_| timed_out("collection_exists"))??;

	if exists {
		time::timeout(LIMIT, client.delete_collection(name.to_string()))
			.await
			.map_err(|_| timed_out("delete_collection"))??;
	}

	Ok(())
}
