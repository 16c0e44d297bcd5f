use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
	Created,
	Updated,
}

/// What the document store reports after an upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreReceipt {
	pub collection: String,
	pub document_id: String,
	pub outcome: UpsertOutcome,
	pub chunk_count: usize,
}
