pub mod artifact;
pub mod document;
pub mod identity;
pub mod receipt;
pub mod tree;

mod error;

pub use artifact::Artifact;
pub use document::{Chunk, DocumentParts, SnippetDocument, ensure_count, ensure_dimension};
pub use error::{Error, Result};
pub use receipt::{StoreReceipt, UpsertOutcome};
pub use tree::{ROOT_PATH, TreeNode};

/// Length of every embedding accepted by the document store.
pub const EMBEDDING_DIM: usize = 1024;
