//! GraphQL file service that lists repository trees and serves file content.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use lode_domain::TreeNode;

use crate::{Error, Result};

const LIST_FILES_QUERY: &str = "query ListFilesByPath($owner: String!, $path: String!) {
  listFilesByPath(owner: $owner, path: $path) { path isDirectory }
}";
const SNIPPET_BY_PATH_QUERY: &str = "query SnippetByPath($owner: String!, $path: String!) {
  snippetByPath(owner: $owner, path: $path) { code }
}";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedFile {
	path: String,
	is_directory: bool,
}

/// Lists the direct children of `path` under `owner`. The root is the empty path.
pub async fn list_directory(
	cfg: &lode_config::Source,
	owner: &str,
	path: &str,
) -> Result<Vec<TreeNode>> {
	let data = query(cfg, LIST_FILES_QUERY, owner, path).await?;

	parse_listing(data)
}

/// Fetches the content of the file at `path`. A missing file is [`Error::NotFound`].
pub async fn fetch_content(cfg: &lode_config::Source, owner: &str, path: &str) -> Result<String> {
	let data = query(cfg, SNIPPET_BY_PATH_QUERY, owner, path).await?;

	parse_snippet(data, owner, path)
}

async fn query(cfg: &lode_config::Source, query: &str, owner: &str, path: &str) -> Result<Value> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"query": query,
		"variables": { "owner": owner, "path": path },
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(cfg.api_key.as_deref(), &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	graphql_data(json)
}

fn graphql_data(mut json: Value) -> Result<Value> {
	if let Some(errors) = json.get("errors").and_then(|v| v.as_array())
		&& !errors.is_empty()
	{
		let message = errors
			.iter()
			.filter_map(|err| err.get("message").and_then(|m| m.as_str()))
			.collect::<Vec<_>>()
			.join("; ");

		return Err(Error::Upstream { message: format!("GraphQL query failed: {message}") });
	}

	match json.get_mut("data").map(Value::take) {
		Some(data) if data.is_object() => Ok(data),
		_ => Err(Error::InvalidResponse {
			message: "GraphQL response is missing data.".to_string(),
		}),
	}
}

fn parse_listing(mut data: Value) -> Result<Vec<TreeNode>> {
	let listed = data.get_mut("listFilesByPath").map(Value::take).unwrap_or(Value::Null);

	if listed.is_null() {
		return Ok(Vec::new());
	}

	let files: Vec<ListedFile> = serde_json::from_value(listed)?;

	Ok(files
		.into_iter()
		.map(|file| TreeNode { path: file.path, is_directory: file.is_directory })
		.collect())
}

fn parse_snippet(data: Value, owner: &str, path: &str) -> Result<String> {
	let Some(snippet) = data.get("snippetByPath").filter(|v| !v.is_null()) else {
		return Err(Error::NotFound { message: format!("File {path} not found for {owner}.") });
	};

	snippet.get("code").and_then(|v| v.as_str()).map(str::to_string).ok_or_else(|| {
		Error::InvalidResponse { message: "Snippet is missing code.".to_string() }
	})
}
