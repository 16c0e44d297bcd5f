#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Qdrant(#[from] Box<qdrant_client::QdrantError>),
	#[error(transparent)]
	Domain(#[from] lode_domain::Error),
	#[error("Invalid payload: {0}")]
	InvalidPayload(String),
}
impl Error {
	/// Store transport failures may clear up; malformed documents never do.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Qdrant(_))
	}
}
impl From<qdrant_client::QdrantError> for Error {
	fn from(err: qdrant_client::QdrantError) -> Self {
		Self::Qdrant(Box::new(err))
	}
}
