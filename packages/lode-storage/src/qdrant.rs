use std::collections::HashMap;

use qdrant_client::{
	client::Payload,
	qdrant::{
		CreateCollectionBuilder, Distance, GetPointsBuilder, MultiVectorComparator,
		MultiVectorConfigBuilder, PointId, PointStruct, UpsertPointsBuilder, Value,
		VectorParamsBuilder, Vector, VectorsConfigBuilder, value::Kind,
	},
};
use serde_json::Value as JsonValue;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::sync::OnceCell;
use uuid::Uuid;

use lode_domain::{SnippetDocument, StoreReceipt, UpsertOutcome, ensure_dimension};

use crate::{Error, Result};

pub const OVERALL_VECTOR_NAME: &str = "overall";
pub const CHUNKS_VECTOR_NAME: &str = "chunks";

/// One Qdrant point per artifact. The whole-snippet embedding is a dense named vector and the
/// chunk embeddings form a max-sim multivector, so a document is always written atomically.
pub struct SnippetStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
	ready: OnceCell<()>,
}
impl SnippetStore {
	pub fn new(cfg: &lode_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self {
			client,
			collection: cfg.collection.clone(),
			vector_dim: cfg.vector_dim,
			ready: OnceCell::new(),
		})
	}

	/// Creates the collection on first use. Later calls return immediately.
	pub async fn ensure_collection(&self) -> Result<()> {
		self.ready.get_or_try_init(|| self.create_collection_if_missing()).await?;

		Ok(())
	}

	pub async fn upsert(&self, doc: &SnippetDocument) -> Result<StoreReceipt> {
		ensure_dimension("overall_embedding", &doc.overall_embedding)?;

		for chunk in &doc.chunks {
			let label = format!("chunks[{}].embedding", chunk.chunk_index);

			ensure_dimension(&label, &chunk.embedding)?;
		}

		self.ensure_collection().await?;

		let point_id = point_id_for(&doc.artifact_id);
		let previous = self.stored_timestamps(point_id).await?;
		let stamps = merge_timestamps(doc.created_at, doc.updated_at, previous);
		let payload = Payload::from(build_payload(doc, &stamps)?);
		let point = PointStruct::new(point_id.to_string(), build_vectors(doc), payload);
		let upsert = UpsertPointsBuilder::new(self.collection.clone(), vec![point]).wait(true);

		self.client.upsert_points(upsert).await?;

		tracing::debug!(
			artifact_id = %doc.artifact_id,
			point_id = %point_id,
			chunk_count = doc.chunk_count(),
			"Snippet document upserted."
		);

		Ok(StoreReceipt {
			collection: self.collection.clone(),
			document_id: doc.artifact_id.clone(),
			outcome: stamps.outcome,
			chunk_count: doc.chunk_count(),
		})
	}

	async fn create_collection_if_missing(&self) -> Result<()> {
		if self.client.collection_exists(self.collection.clone()).await? {
			return Ok(());
		}

		let mut vectors_config = VectorsConfigBuilder::default();

		vectors_config.add_named_vector_params(
			OVERALL_VECTOR_NAME,
			VectorParamsBuilder::new(self.vector_dim.into(), Distance::Cosine),
		);
		vectors_config.add_named_vector_params(
			CHUNKS_VECTOR_NAME,
			VectorParamsBuilder::new(self.vector_dim.into(), Distance::Cosine)
				.multivector_config(MultiVectorConfigBuilder::new(MultiVectorComparator::MaxSim)),
		);

		let builder =
			CreateCollectionBuilder::new(self.collection.clone()).vectors_config(vectors_config);

		match self.client.create_collection(builder).await {
			Ok(_) => {
				tracing::info!(collection = %self.collection, "Snippet collection created.");

				Ok(())
			},
			// Another writer may have created it between the check and the create.
			Err(err) =>
				if self.client.collection_exists(self.collection.clone()).await? {
					Ok(())
				} else {
					Err(err.into())
				},
		}
	}

	async fn stored_timestamps(&self, point_id: Uuid) -> Result<Option<StoredTimestamps>> {
		let get = GetPointsBuilder::new(
			self.collection.clone(),
			vec![PointId::from(point_id.to_string())],
		)
		.with_payload(true)
		.with_vectors(false);
		let response = self.client.get_points(get).await?;
		let Some(point) = response.result.into_iter().next() else {
			return Ok(None);
		};

		parse_timestamps(&point.payload)
	}
}

/// Qdrant point id for an artifact. Stable across runs so re-ingestion overwrites.
pub fn point_id_for(artifact_id: &str) -> Uuid {
	Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("lode:snippet:{artifact_id}").as_bytes())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StoredTimestamps {
	created_at: OffsetDateTime,
	updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamps {
	created_at: OffsetDateTime,
	updated_at: OffsetDateTime,
	outcome: UpsertOutcome,
}

/// `created_at` survives from the first write; `updated_at` never moves backwards.
fn merge_timestamps(
	created_at: OffsetDateTime,
	updated_at: OffsetDateTime,
	previous: Option<StoredTimestamps>,
) -> Stamps {
	match previous {
		Some(prev) => Stamps {
			created_at: prev.created_at,
			updated_at: updated_at.max(prev.updated_at),
			outcome: UpsertOutcome::Updated,
		},
		None => Stamps { created_at, updated_at, outcome: UpsertOutcome::Created },
	}
}

fn build_payload(doc: &SnippetDocument, stamps: &Stamps) -> Result<HashMap<String, Value>> {
	let chunks = doc
		.chunks
		.iter()
		.map(|chunk| {
			serde_json::json!({
				"chunk_index": chunk.chunk_index,
				"code": chunk.code,
				"summary": chunk.summary,
			})
		})
		.collect::<Vec<_>>();
	let mut payload_map = HashMap::new();

	payload_map.insert("artifact_id".to_string(), Value::from(doc.artifact_id.clone()));
	payload_map.insert("code".to_string(), Value::from(doc.code.clone()));
	payload_map.insert("overall_summary".to_string(), Value::from(doc.overall_summary.clone()));
	payload_map.insert("chunk_count".to_string(), Value::from(doc.chunk_count() as i64));
	payload_map.insert("chunks".to_string(), Value::from(JsonValue::Array(chunks)));
	payload_map.insert(
		"created_at".to_string(),
		Value::from(JsonValue::String(format_timestamp(stamps.created_at)?)),
	);
	payload_map.insert(
		"updated_at".to_string(),
		Value::from(JsonValue::String(format_timestamp(stamps.updated_at)?)),
	);

	Ok(payload_map)
}

fn build_vectors(doc: &SnippetDocument) -> HashMap<String, Vector> {
	let mut vector_map = HashMap::new();

	vector_map.insert(OVERALL_VECTOR_NAME.to_string(), Vector::from(doc.overall_embedding.clone()));

	// Qdrant rejects empty multivectors, so chunkless snippets carry only the overall vector.
	if !doc.chunks.is_empty() {
		let chunk_vectors =
			doc.chunks.iter().map(|chunk| chunk.embedding.clone()).collect::<Vec<_>>();

		vector_map.insert(CHUNKS_VECTOR_NAME.to_string(), Vector::new_multi(chunk_vectors));
	}

	vector_map
}

fn parse_timestamps(payload: &HashMap<String, Value>) -> Result<Option<StoredTimestamps>> {
	let (Some(created_at), Some(updated_at)) =
		(payload_timestamp(payload, "created_at")?, payload_timestamp(payload, "updated_at")?)
	else {
		return Ok(None);
	};

	Ok(Some(StoredTimestamps { created_at, updated_at }))
}

fn payload_timestamp(
	payload: &HashMap<String, Value>,
	key: &str,
) -> Result<Option<OffsetDateTime>> {
	let Some(value) = payload.get(key) else {
		return Ok(None);
	};
	let Some(Kind::StringValue(text)) = value.kind.as_ref() else {
		return Err(Error::InvalidPayload(format!("{key} must be a string.")));
	};

	OffsetDateTime::parse(text, &Rfc3339)
		.map(Some)
		.map_err(|err| Error::InvalidPayload(format!("{key} is not RFC 3339: {err}.")))
}

fn format_timestamp(ts: OffsetDateTime) -> Result<String> {
	ts.format(&Rfc3339).map_err(|err| Error::InvalidPayload(format!("Invalid timestamp: {err}.")))
}
