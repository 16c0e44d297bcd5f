use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use lode_domain::ROOT_PATH;

use crate::{BoxFuture, Error, LaunchOutcome, Pipeline, Result, RunContext, StartRequest};

/// Hands detached runs to the substrate. The caller keeps no handle to the started run.
pub trait ProcessLauncher
where
	Self: Send + Sync,
{
	fn launch<'a>(&'a self, request: StartRequest) -> BoxFuture<'a, Result<LaunchOutcome>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPath {
	pub path: String,
	pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlReport {
	pub owner: String,
	/// Files handed to the launcher, including those whose run was already in flight.
	pub files_dispatched: usize,
	pub files_deduplicated: usize,
	pub directories_listed: usize,
	pub skipped: Vec<SkippedPath>,
}
impl CrawlReport {
	fn new(owner: &str) -> Self {
		Self {
			owner: owner.to_string(),
			files_dispatched: 0,
			files_deduplicated: 0,
			directories_listed: 0,
			skipped: Vec::new(),
		}
	}
}

/// Pending directories in discovery order plus every directory already taken off the queue.
#[derive(Debug)]
pub struct CrawlState {
	pending: VecDeque<String>,
	visited: HashSet<String>,
}
impl CrawlState {
	pub fn new() -> Self {
		Self { pending: VecDeque::from([ROOT_PATH.to_string()]), visited: HashSet::new() }
	}

	/// Next unvisited directory, marked visited on the way out.
	pub fn next_directory(&mut self) -> Option<String> {
		while let Some(path) = self.pending.pop_front() {
			if self.visited.insert(path.clone()) {
				return Some(path);
			}
		}

		None
	}

	pub fn enqueue(&mut self, path: String) {
		if !self.visited.contains(&path) {
			self.pending.push_back(path);
		}
	}
}
impl Default for CrawlState {
	fn default() -> Self {
		Self::new()
	}
}

impl Pipeline {
	/// Breadth-first traversal of `owner`'s tree. Every file is handed to `launcher` as a detached
	/// file run; the crawl never waits for one. A directory whose listing fails is skipped and
	/// reported, and traversal continues.
	pub async fn crawl_tree(
		&self,
		ctx: &RunContext,
		owner: &str,
		launcher: &dyn ProcessLauncher,
	) -> Result<CrawlReport> {
		let lister = &self.collaborators.lister;
		let mut state = CrawlState::new();
		let mut report = CrawlReport::new(owner);

		tracing::info!(run_id = %ctx.run_id, owner, "Tree crawl started.");

		while let Some(path) = state.next_directory() {
			ctx.ensure_active()?;

			let step_key = format!("list:{path}");
			let dir = path.as_str();
			let listed = self
				.executor
				.execute(ctx, &step_key, &self.steps.list, move || lister.list(owner, dir))
				.await;
			let children = match listed {
				Ok(children) => children,
				Err(Error::Step(failure)) => {
					tracing::warn!(
						run_id = %ctx.run_id,
						owner,
						path = %path,
						error = %failure,
						"Directory listing failed. Skipping branch."
					);

					report.skipped.push(SkippedPath { path, reason: failure.to_string() });

					continue;
				},
				Err(err) => return Err(err),
			};

			ctx.ensure_active()?;

			report.directories_listed += 1;

			for child in children {
				if child.is_directory {
					state.enqueue(child.path);

					continue;
				}

				let request = StartRequest::File { owner: owner.to_string(), path: child.path };

				match launcher.launch(request).await? {
					LaunchOutcome::Started { run_id } => {
						tracing::debug!(
							run_id = %ctx.run_id,
							child_run_id = %run_id,
							"File run dispatched."
						);
					},
					LaunchOutcome::AlreadyRunning { run_id } => {
						tracing::debug!(
							run_id = %ctx.run_id,
							child_run_id = %run_id,
							"File run already in flight."
						);

						report.files_deduplicated += 1;
					},
				}

				report.files_dispatched += 1;
			}
		}

		tracing::info!(
			run_id = %ctx.run_id,
			owner,
			files_dispatched = report.files_dispatched,
			directories_listed = report.directories_listed,
			skipped = report.skipped.len(),
			"Tree crawl completed."
		);

		Ok(report)
	}
}
