//! In-process substrate hosting artifact, file and crawl runs. Start requests travel through an
//! unbounded channel to a dispatcher that deduplicates run identities, so a crawl can launch file
//! runs without holding any handle to them.

use std::{
	collections::{HashMap, VecDeque},
	sync::{Arc, Mutex},
	time::Duration,
};

use serde::Serialize;
use tokio::{
	sync::{Semaphore, mpsc, oneshot, watch},
	time,
};
use tokio_util::sync::CancellationToken;

use lode_domain::{Artifact, identity};

use crate::{
	BoxFuture, CrawlReport, Error, FailureKind, IngestionReport, Pipeline, ProcessLauncher, Result,
	RunContext, StepJournal, TerminalFailure,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartRequest {
	Artifact(Artifact),
	Crawl { owner: String },
	File { owner: String, path: String },
}
impl StartRequest {
	/// Deterministic identity of the run this request starts.
	pub fn run_id(&self) -> String {
		match self {
			Self::Artifact(artifact) => identity::artifact_run_id(&artifact.id),
			Self::Crawl { owner } => identity::crawl_run_id(owner),
			Self::File { owner, path } => identity::file_run_id(owner, path),
		}
	}

	fn kind(&self) -> &'static str {
		match self {
			Self::Artifact(_) => "artifact",
			Self::Crawl { .. } => "crawl",
			Self::File { .. } => "file",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "launch", rename_all = "snake_case")]
pub enum LaunchOutcome {
	Started { run_id: String },
	/// A run with the same identity is still in flight. Nothing was started.
	AlreadyRunning { run_id: String },
}
impl LaunchOutcome {
	pub fn run_id(&self) -> &str {
		match self {
			Self::Started { run_id } | Self::AlreadyRunning { run_id } => run_id,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunResult {
	Ingestion(IngestionReport),
	Crawl(CrawlReport),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
	Running,
	Completed {
		result: RunResult,
	},
	Failed {
		message: String,
		#[serde(skip_serializing_if = "Option::is_none")]
		failure: Option<TerminalFailure>,
	},
	TimedOut {
		message: String,
	},
	Cancelled,
}
impl RunStatus {
	pub fn is_terminal(&self) -> bool {
		!matches!(self, Self::Running)
	}

	pub fn label(&self) -> &'static str {
		match self {
			Self::Running => "running",
			Self::Completed { .. } => "completed",
			Self::Failed { .. } => "failed",
			Self::TimedOut { .. } => "timed_out",
			Self::Cancelled => "cancelled",
		}
	}

	fn from_outcome(outcome: Result<RunResult>) -> Self {
		match outcome {
			Ok(result) => Self::Completed { result },
			Err(Error::Cancelled) => Self::Cancelled,
			Err(err @ Error::TimedOut { .. }) => Self::TimedOut { message: err.to_string() },
			Err(Error::Step(failure)) if failure.kind == FailureKind::TimedOut =>
				Self::TimedOut { message: failure.to_string() },
			Err(Error::Step(failure)) =>
				Self::Failed { message: failure.to_string(), failure: Some(failure) },
			Err(err) => Self::Failed { message: err.to_string(), failure: None },
		}
	}
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
	pub max_concurrent_runs: usize,
	/// Whole-run deadline. Once it passes the run is cancelled at its next step boundary and
	/// reported as timed out.
	pub run_timeout: Option<Duration>,
	/// Finished runs kept queryable through [`Runtime::status`].
	pub retain_terminal_runs: usize,
}
impl From<&lode_config::Runtime> for RuntimeSettings {
	fn from(cfg: &lode_config::Runtime) -> Self {
		Self {
			max_concurrent_runs: cfg.max_concurrent_runs as usize,
			run_timeout: cfg.run_timeout_secs.map(Duration::from_secs),
			retain_terminal_runs: cfg.retain_terminal_runs as usize,
		}
	}
}
impl Default for RuntimeSettings {
	fn default() -> Self {
		Self::from(&lode_config::Runtime::default())
	}
}

struct Envelope {
	request: StartRequest,
	reply: oneshot::Sender<LaunchOutcome>,
}

/// Sends start requests to the dispatcher. Cloned into every crawl run.
#[derive(Clone)]
pub struct Launcher {
	tx: mpsc::UnboundedSender<Envelope>,
}
impl ProcessLauncher for Launcher {
	fn launch<'a>(&'a self, request: StartRequest) -> BoxFuture<'a, Result<LaunchOutcome>> {
		Box::pin(async move {
			let (reply, outcome) = oneshot::channel();

			self.tx.send(Envelope { request, reply }).map_err(|_| Error::ShuttingDown)?;

			outcome.await.map_err(|_| Error::ShuttingDown)
		})
	}
}

struct RunEntry {
	status: watch::Sender<RunStatus>,
	cancel: CancellationToken,
	generation: u64,
}

/// Runs by identity. Finished runs are evicted oldest first once more than `retain` of them
/// accumulate; in-flight runs always stay.
struct Registry {
	runs: HashMap<String, RunEntry>,
	finished: VecDeque<(String, u64)>,
	next_generation: u64,
	retain: usize,
}
impl Registry {
	fn new(retain: usize) -> Self {
		Self {
			runs: HashMap::new(),
			finished: VecDeque::new(),
			next_generation: 0,
			retain: retain.max(1),
		}
	}

	fn get(&self, run_id: &str) -> Option<&RunEntry> {
		self.runs.get(run_id)
	}

	fn values(&self) -> impl Iterator<Item = &RunEntry> {
		self.runs.values()
	}

	fn insert(
		&mut self,
		run_id: String,
		status: watch::Sender<RunStatus>,
		cancel: CancellationToken,
	) {
		let generation = self.next_generation;

		self.next_generation += 1;
		self.runs.insert(run_id, RunEntry { status, cancel, generation });
	}

	fn finish(&mut self, run_id: &str, status: RunStatus) {
		let Some(entry) = self.runs.get(run_id) else {
			return;
		};

		entry.status.send_replace(status);
		self.finished.push_back((run_id.to_string(), entry.generation));

		while self.finished.len() > self.retain {
			let Some((evicted, generation)) = self.finished.pop_front() else {
				break;
			};

			// A relaunch under the same identity has a newer generation and stays.
			if self.runs.get(&evicted).is_some_and(|entry| entry.generation == generation) {
				self.runs.remove(&evicted);

				tracing::debug!(run_id = %evicted, "Finished run evicted from registry.");
			}
		}
	}
}

struct Shared {
	pipeline: Pipeline,
	runs: Mutex<Registry>,
	permits: Arc<Semaphore>,
	run_timeout: Option<Duration>,
}
impl Shared {
	fn admit(self: &Arc<Self>, request: StartRequest, launcher: &Launcher) -> LaunchOutcome {
		let run_id = request.run_id();
		let mut runs = self.runs.lock().unwrap_or_else(|err| err.into_inner());

		if let Some(entry) = runs.get(&run_id)
			&& !entry.status.borrow().is_terminal()
		{
			tracing::debug!(run_id = %run_id, "Run already in flight. Skipping start.");

			return LaunchOutcome::AlreadyRunning { run_id };
		}

		let (status, _) = watch::channel(RunStatus::Running);
		// Every run gets its own token, so cancelling a crawl never reaches its file runs.
		let cancel = CancellationToken::new();

		runs.insert(run_id.clone(), status, cancel.clone());

		tracing::info!(run_id = %run_id, kind = request.kind(), "Run started.");

		tokio::spawn(run(self.clone(), launcher.clone(), run_id.clone(), request, cancel));

		LaunchOutcome::Started { run_id }
	}

	async fn execute(
		&self,
		ctx: &RunContext,
		request: StartRequest,
		launcher: &Launcher,
	) -> Result<RunResult> {
		let work = async {
			match request {
				StartRequest::Artifact(artifact) =>
					self.pipeline.ingest_artifact(ctx, &artifact).await.map(RunResult::Ingestion),
				StartRequest::Crawl { owner } =>
					self.pipeline.crawl_tree(ctx, &owner, launcher).await.map(RunResult::Crawl),
				StartRequest::File { owner, path } =>
					self.pipeline.ingest_file(ctx, &owner, &path).await.map(RunResult::Ingestion),
			}
		};

		let Some(limit) = self.run_timeout else {
			return work.await;
		};

		tokio::pin!(work);

		tokio::select! {
			outcome = &mut work => outcome,
			_ = time::sleep(limit) => {
				let limit_ms = limit.as_millis() as u64;

				tracing::warn!(
					run_id = %ctx.run_id,
					limit_ms,
					"Run deadline passed. Stopping at the next step boundary."
				);

				// The step in flight runs to completion.
				ctx.cancel.cancel();

				match work.await {
					Err(Error::Cancelled) => Err(Error::TimedOut { limit_ms }),
					outcome => outcome,
				}
			},
		}
	}

	fn publish(&self, run_id: &str, status: RunStatus) {
		self.runs.lock().unwrap_or_else(|err| err.into_inner()).finish(run_id, status);
	}
}

async fn run(
	shared: Arc<Shared>,
	launcher: Launcher,
	run_id: String,
	request: StartRequest,
	cancel: CancellationToken,
) {
	let ctx = RunContext::new(run_id.clone(), cancel.clone());
	let permit = tokio::select! {
		permit = shared.permits.clone().acquire_owned() => permit.map_err(|_| Error::ShuttingDown),
		_ = cancel.cancelled() => Err(Error::Cancelled),
	};
	let outcome = match permit {
		Ok(_permit) => shared.execute(&ctx, request, &launcher).await,
		Err(err) => Err(err),
	};
	let status = RunStatus::from_outcome(outcome);

	shared.pipeline.executor.journal().clear_run(&run_id);

	match &status {
		RunStatus::Completed { .. } | RunStatus::Cancelled => {
			tracing::info!(run_id = %run_id, status = status.label(), "Run finished.");
		},
		RunStatus::Failed { message, .. } | RunStatus::TimedOut { message } => {
			tracing::warn!(
				run_id = %run_id,
				status = status.label(),
				error = %message,
				"Run finished."
			);
		},
		RunStatus::Running => {},
	}

	shared.publish(&run_id, status);
}

async fn dispatch(
	shared: Arc<Shared>,
	launcher: Launcher,
	mut rx: mpsc::UnboundedReceiver<Envelope>,
	shutdown: CancellationToken,
) {
	loop {
		let envelope = tokio::select! {
			biased;
			_ = shutdown.cancelled() => break,
			envelope = rx.recv() => match envelope {
				Some(envelope) => envelope,
				None => break,
			},
		};
		let outcome = shared.admit(envelope.request, &launcher);

		// The caller may have stopped waiting; the run goes ahead regardless.
		let _ = envelope.reply.send(outcome);
	}

	tracing::info!("Run dispatcher stopped.");
}

/// Handle to the substrate. Cheap to clone.
#[derive(Clone)]
pub struct Runtime {
	shared: Arc<Shared>,
	launcher: Launcher,
	shutdown: CancellationToken,
}
impl Runtime {
	/// Starts the dispatcher on the current Tokio runtime.
	pub fn new(pipeline: Pipeline, settings: RuntimeSettings) -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		let shared = Arc::new(Shared {
			pipeline,
			runs: Mutex::new(Registry::new(settings.retain_terminal_runs)),
			permits: Arc::new(Semaphore::new(settings.max_concurrent_runs.max(1))),
			run_timeout: settings.run_timeout,
		});
		let launcher = Launcher { tx };
		let shutdown = CancellationToken::new();

		tokio::spawn(dispatch(shared.clone(), launcher.clone(), rx, shutdown.clone()));

		Self { shared, launcher, shutdown }
	}

	pub fn launcher(&self) -> Launcher {
		self.launcher.clone()
	}

	pub fn journal(&self) -> &Arc<dyn StepJournal> {
		self.shared.pipeline.executor.journal()
	}

	pub async fn launch(&self, request: StartRequest) -> Result<LaunchOutcome> {
		self.launcher.launch(request).await
	}

	pub fn status(&self, run_id: &str) -> Option<RunStatus> {
		let runs = self.shared.runs.lock().unwrap_or_else(|err| err.into_inner());

		runs.get(run_id).map(|entry| entry.status.borrow().clone())
	}

	/// Waits until the run reaches a terminal status. `None` for unknown runs.
	pub async fn wait(&self, run_id: &str) -> Option<RunStatus> {
		let mut rx = {
			let runs = self.shared.runs.lock().unwrap_or_else(|err| err.into_inner());

			runs.get(run_id)?.status.subscribe()
		};
		let status = rx.wait_for(RunStatus::is_terminal).await.ok()?;

		Some(status.clone())
	}

	/// Requests cancellation. The run stops at its next step boundary. Returns `false` for
	/// unknown runs.
	pub fn cancel(&self, run_id: &str) -> bool {
		let runs = self.shared.runs.lock().unwrap_or_else(|err| err.into_inner());
		let Some(entry) = runs.get(run_id) else {
			return false;
		};

		if !entry.status.borrow().is_terminal() {
			tracing::info!(run_id, "Run cancellation requested.");

			entry.cancel.cancel();
		}

		true
	}

	/// Stops accepting start requests and cancels every run in flight.
	pub fn shutdown(&self) {
		self.shutdown.cancel();
		self.shared.permits.close();

		let runs = self.shared.runs.lock().unwrap_or_else(|err| err.into_inner());

		for entry in runs.values() {
			entry.cancel.cancel();
		}
	}
}
