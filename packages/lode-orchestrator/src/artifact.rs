use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use lode_domain::{
	Artifact, DocumentParts, SnippetDocument, StoreReceipt, ensure_count, ensure_dimension,
};

use crate::{Pipeline, Result, RunContext, StepError};

pub const SUMMARIZE_STEP: &str = "summarize";
pub const EMBED_SUMMARY_STEP: &str = "embed_summary";
pub const CHUNK_STEP: &str = "chunk";
pub const SUMMARIZE_CHUNKS_STEP: &str = "summarize_chunks";
pub const EMBED_CHUNK_SUMMARIES_STEP: &str = "embed_chunk_summaries";
pub const INDEX_STEP: &str = "index";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionReport {
	pub artifact_id: String,
	pub overall_summary: String,
	pub chunk_count: usize,
	pub store_result: StoreReceipt,
}

impl Pipeline {
	/// Runs the six ingestion steps for one artifact. The document is written only after every
	/// upstream step succeeded, so a failed or cancelled run leaves the store untouched.
	pub async fn ingest_artifact(
		&self,
		ctx: &RunContext,
		artifact: &Artifact,
	) -> Result<IngestionReport> {
		artifact.validate()?;

		tracing::info!(
			run_id = %ctx.run_id,
			artifact_id = %artifact.id,
			bytes = artifact.content.len(),
			"Artifact ingestion started."
		);

		let ((overall_summary, overall_embedding), chunk_codes) = if self.parallel_chunking {
			let (summary, chunks) =
				tokio::join!(self.summary_branch(ctx, artifact), self.chunk(ctx, artifact));

			(summary?, chunks?)
		} else {
			let summary = self.summary_branch(ctx, artifact).await?;
			let chunks = self.chunk(ctx, artifact).await?;

			(summary, chunks)
		};
		let chunk_summaries = self.summarize_chunks(ctx, &chunk_codes).await?;
		let chunk_embeddings = self.embed_chunk_summaries(ctx, &chunk_summaries).await?;
		let parts = DocumentParts {
			overall_summary,
			overall_embedding,
			chunk_codes,
			chunk_summaries,
			chunk_embeddings,
		};
		let store_result = self.index(ctx, artifact, &parts).await?;
		let report = IngestionReport {
			artifact_id: artifact.id.clone(),
			overall_summary: parts.overall_summary,
			chunk_count: store_result.chunk_count,
			store_result,
		};

		tracing::info!(
			run_id = %ctx.run_id,
			artifact_id = %report.artifact_id,
			chunk_count = report.chunk_count,
			outcome = ?report.store_result.outcome,
			"Artifact ingestion completed."
		);

		Ok(report)
	}

	async fn summary_branch(
		&self,
		ctx: &RunContext,
		artifact: &Artifact,
	) -> Result<(String, Vec<f32>)> {
		let summarizer = &self.collaborators.summarizer;
		let embedder = &self.collaborators.embedder;
		let summary = self
			.executor
			.execute(ctx, SUMMARIZE_STEP, &self.steps.summarize, move || {
				summarizer.summarize(&artifact.content)
			})
			.await?;
		let summary_text = summary.as_str();
		let embedding = self
			.executor
			.execute(ctx, EMBED_SUMMARY_STEP, &self.steps.embed_summary, move || async move {
				let embedding = embedder.embed(summary_text).await?;

				ensure_dimension("overall_embedding", &embedding)?;

				Ok::<_, StepError>(embedding)
			})
			.await?;

		Ok((summary, embedding))
	}

	async fn chunk(&self, ctx: &RunContext, artifact: &Artifact) -> Result<Vec<String>> {
		let chunker = &self.collaborators.chunker;

		self.executor
			.execute(ctx, CHUNK_STEP, &self.steps.chunk, move || async move {
				let chunks = chunker.chunk(&artifact.content).await?;

				if chunks.is_empty() && !artifact.is_blank() {
					return Err(StepError::fatal(
						"Chunker returned no chunks for non-empty content.",
					));
				}

				Ok::<_, StepError>(chunks)
			})
			.await
	}

	async fn summarize_chunks(&self, ctx: &RunContext, chunks: &[String]) -> Result<Vec<String>> {
		if chunks.is_empty() {
			return Ok(Vec::new());
		}

		let summarizer = &self.collaborators.summarizer;

		self.executor
			.execute(ctx, SUMMARIZE_CHUNKS_STEP, &self.steps.summarize_chunks, move || async move {
				let summaries = summarizer.summarize_chunks(chunks).await?;

				ensure_count("chunk summaries", chunks.len(), summaries.len())?;

				Ok::<_, StepError>(summaries)
			})
			.await
	}

	async fn embed_chunk_summaries(
		&self,
		ctx: &RunContext,
		summaries: &[String],
	) -> Result<Vec<Vec<f32>>> {
		if summaries.is_empty() {
			return Ok(Vec::new());
		}

		let embedder = &self.collaborators.embedder;
		let config = &self.steps.embed_chunk_summaries;

		self.executor
			.execute(ctx, EMBED_CHUNK_SUMMARIES_STEP, config, move || async move {
				let embeddings = embedder.embed_batch(summaries).await?;

				ensure_count("chunk embeddings", summaries.len(), embeddings.len())?;

				for (idx, embedding) in embeddings.iter().enumerate() {
					ensure_dimension(&format!("chunks[{idx}].embedding"), embedding)?;
				}

				Ok::<_, StepError>(embeddings)
			})
			.await
	}

	async fn index(
		&self,
		ctx: &RunContext,
		artifact: &Artifact,
		parts: &DocumentParts,
	) -> Result<StoreReceipt> {
		let store = &self.collaborators.store;

		self.executor
			.execute(ctx, INDEX_STEP, &self.steps.index, move || async move {
				let doc =
					SnippetDocument::assemble(artifact, parts.clone(), OffsetDateTime::now_utc())?;

				store.upsert(&doc).await
			})
			.await
	}
}
