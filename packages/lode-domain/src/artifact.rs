use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One unit of source code submitted for ingestion. The id doubles as the document key, so
/// re-submitting an id replaces the earlier document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
	pub id: String,
	pub content: String,
}
impl Artifact {
	pub fn is_blank(&self) -> bool {
		self.content.trim().is_empty()
	}

	pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
		Self { id: id.into(), content: content.into() }
	}

	/// Only the id is required. Empty content is a valid artifact that indexes with no chunks.
	pub fn validate(&self) -> Result<()> {
		if self.id.trim().is_empty() {
			return Err(Error::EmptyArtifactId);
		}

		Ok(())
	}
}
