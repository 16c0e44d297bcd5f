//! Deterministic run identities. Starting a run whose identity is already in flight must be a
//! no-op, so every identity is a pure function of the trigger payload.

pub fn artifact_run_id(artifact_id: &str) -> String {
	format!("snippet-ingestion-{artifact_id}")
}

pub fn crawl_run_id(owner: &str) -> String {
	format!("repository-ingestion-{owner}")
}

pub fn file_run_id(owner: &str, path: &str) -> String {
	format!("repo-file:{owner}:{path}")
}

/// Identity of the artifact run nested inside a file run.
pub fn file_artifact_run_id(owner: &str, path: &str) -> String {
	format!("ingest:{owner}:{path}")
}
