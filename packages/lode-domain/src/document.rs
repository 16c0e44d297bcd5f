use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Artifact, EMBEDDING_DIM, Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
	pub chunk_index: u32,
	pub code: String,
	pub summary: String,
	pub embedding: Vec<f32>,
}

/// The unit written to the document store, one per artifact id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnippetDocument {
	pub artifact_id: String,
	pub code: String,
	pub overall_summary: String,
	pub overall_embedding: Vec<f32>,
	pub chunks: Vec<Chunk>,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
}
impl SnippetDocument {
	/// Builds the document from the outputs of every pipeline step. Chunk `i` pairs the `i`-th
	/// code, summary and embedding.
	pub fn assemble(
		artifact: &Artifact,
		parts: DocumentParts,
		now: OffsetDateTime,
	) -> Result<Self> {
		let DocumentParts {
			overall_summary,
			overall_embedding,
			chunk_codes,
			chunk_summaries,
			chunk_embeddings,
		} = parts;

		ensure_dimension("overall_embedding", &overall_embedding)?;
		ensure_count("chunk summaries", chunk_codes.len(), chunk_summaries.len())?;
		ensure_count("chunk embeddings", chunk_summaries.len(), chunk_embeddings.len())?;

		let mut chunks = Vec::with_capacity(chunk_codes.len());

		for (idx, ((code, summary), embedding)) in
			chunk_codes.into_iter().zip(chunk_summaries).zip(chunk_embeddings).enumerate()
		{
			ensure_dimension(&format!("chunks[{idx}].embedding"), &embedding)?;

			chunks.push(Chunk { chunk_index: idx as u32, code, summary, embedding });
		}

		Ok(Self {
			artifact_id: artifact.id.clone(),
			code: artifact.content.clone(),
			overall_summary,
			overall_embedding,
			chunks,
			created_at: now,
			updated_at: now,
		})
	}

	pub fn chunk_count(&self) -> usize {
		self.chunks.len()
	}
}

#[derive(Debug, Clone, Default)]
pub struct DocumentParts {
	pub overall_summary: String,
	pub overall_embedding: Vec<f32>,
	pub chunk_codes: Vec<String>,
	pub chunk_summaries: Vec<String>,
	pub chunk_embeddings: Vec<Vec<f32>>,
}

pub fn ensure_dimension(label: &str, vec: &[f32]) -> Result<()> {
	if vec.len() != EMBEDDING_DIM {
		return Err(Error::DimensionMismatch {
			label: label.to_string(),
			expected: EMBEDDING_DIM,
			actual: vec.len(),
		});
	}

	Ok(())
}

pub fn ensure_count(label: &str, expected: usize, actual: usize) -> Result<()> {
	if expected != actual {
		return Err(Error::CountMismatch { label: label.to_string(), expected, actual });
	}

	Ok(())
}
