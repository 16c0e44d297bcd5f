//! Durable orchestration of code-artifact ingestion: a retrying step executor, the artifact, file
//! and tree-crawl processes built on it, and an in-process runtime that hosts them.

pub mod artifact;
pub mod collaborators;
pub mod crawl;
pub mod executor;
pub mod file;
pub mod journal;
pub mod retry;
pub mod runtime;
pub mod trigger;

mod error;

pub use artifact::IngestionReport;
pub use collaborators::{
	Chunker, Collaborators, ContentFetcher, DocumentStore, Embedder, Lister, Summarizer,
};
pub use crawl::{CrawlReport, ProcessLauncher, SkippedPath};
pub use error::{Error, FailureKind, Result, StepError, TerminalFailure};
pub use executor::StepExecutor;
pub use journal::{MemoryJournal, StepJournal};
pub use retry::{RetryPolicy, StepConfig, StepTable};
pub use runtime::{
	LaunchOutcome, Launcher, RunResult, RunStatus, Runtime, RuntimeSettings, StartRequest,
};
pub use trigger::{TriggerEvent, TriggerError, TriggerListener, TriggerOutcome};

use std::{future::Future, pin::Pin, sync::Arc};

use tokio_util::sync::CancellationToken;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Identity and cancellation signal of the run a step belongs to.
#[derive(Debug, Clone)]
pub struct RunContext {
	pub run_id: String,
	pub cancel: CancellationToken,
}
impl RunContext {
	pub fn new(run_id: impl Into<String>, cancel: CancellationToken) -> Self {
		Self { run_id: run_id.into(), cancel }
	}

	pub fn ensure_active(&self) -> Result<()> {
		if self.cancel.is_cancelled() {
			return Err(Error::Cancelled);
		}

		Ok(())
	}
}

/// Everything the ingestion processes need: collaborators, the step executor and per-step
/// settings.
pub struct Pipeline {
	pub collaborators: Collaborators,
	pub executor: StepExecutor,
	pub steps: StepTable,
	/// Run chunking alongside the summary branch of an artifact run.
	pub parallel_chunking: bool,
}
impl Pipeline {
	pub fn new(
		collaborators: Collaborators,
		journal: Arc<dyn StepJournal>,
		steps: StepTable,
		parallel_chunking: bool,
	) -> Self {
		Self { collaborators, executor: StepExecutor::new(journal), steps, parallel_chunking }
	}
}
