use serde::{Deserialize, Serialize};

/// Path of the namespace root.
pub const ROOT_PATH: &str = "";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreeNode {
	pub path: String,
	pub is_directory: bool,
}
impl TreeNode {
	pub fn directory(path: impl Into<String>) -> Self {
		Self { path: path.into(), is_directory: true }
	}

	pub fn file(path: impl Into<String>) -> Self {
		Self { path: path.into(), is_directory: false }
	}
}
