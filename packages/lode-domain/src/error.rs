pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	#[error("Artifact id must be non-empty.")]
	EmptyArtifactId,
	#[error("{label} has {actual} dimensions; expected {expected}.")]
	DimensionMismatch { label: String, expected: usize, actual: usize },
	#[error("{label} returned {actual} items for {expected} inputs.")]
	CountMismatch { label: String, expected: usize, actual: usize },
}
