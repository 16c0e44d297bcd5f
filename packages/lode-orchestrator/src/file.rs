use lode_domain::{Artifact, identity};

use crate::{IngestionReport, Pipeline, Result, RunContext};

pub const FETCH_STEP: &str = "fetch";

impl Pipeline {
	/// Fetches one file and ingests it under its path as the artifact id. The nested artifact run
	/// shares this run's cancellation and has its own identity and journal entries.
	pub async fn ingest_file(
		&self,
		ctx: &RunContext,
		owner: &str,
		path: &str,
	) -> Result<IngestionReport> {
		let fetcher = &self.collaborators.fetcher;
		let content = self
			.executor
			.execute(ctx, FETCH_STEP, &self.steps.fetch, move || fetcher.fetch(owner, path))
			.await?;

		tracing::debug!(run_id = %ctx.run_id, owner, path, bytes = content.len(), "File fetched.");

		let nested =
			RunContext::new(identity::file_artifact_run_id(owner, path), ctx.cancel.clone());
		let result = self.ingest_artifact(&nested, &Artifact::new(path, content)).await;

		self.executor.journal().clear_run(&nested.run_id);

		result
	}
}
