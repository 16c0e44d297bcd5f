pub mod qdrant;

mod error;

pub use error::Error;
pub use qdrant::{CHUNKS_VECTOR_NAME, OVERALL_VECTOR_NAME, SnippetStore, point_id_for};

pub type Result<T, E = Error> = std::result::Result<T, E>;
