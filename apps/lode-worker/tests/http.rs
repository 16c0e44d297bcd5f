use axum::{
	Router,
	body::{self, Body},
	http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tower::util::ServiceExt;

use lode_domain::TreeNode;
use lode_orchestrator::RuntimeSettings;
use lode_testkit::{FakeTree, Fakes};
use lode_worker::{routes, state::AppState};

fn app(fakes: &Fakes) -> (Router, AppState) {
	let state = AppState::with_runtime(fakes.runtime(RuntimeSettings::default()));

	(routes::router(state.clone()), state)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
	let response = app.clone().oneshot(request).await.expect("Failed to call router.");
	let status = response.status();
	let bytes =
		body::to_bytes(response.into_body(), usize::MAX).await.expect("Failed to read body.");
	let value = if bytes.is_empty() {
		Value::Null
	} else {
		serde_json::from_slice(&bytes).expect("Response body must be JSON.")
	};

	(status, value)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
	Request::builder()
		.method("POST")
		.uri(uri)
		.header("content-type", "application/json")
		.body(Body::from(body.to_string()))
		.expect("Failed to build request.")
}

fn get(uri: &str) -> Request<Body> {
	Request::builder().uri(uri).body(Body::empty()).expect("Failed to build request.")
}

#[tokio::test]
async fn health_ok() {
	let fakes = Fakes::new();
	let (app, _) = app(&fakes);
	let (status, _) = send(&app, get("/health")).await;

	assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn snippet_event_starts_an_ingestion_run() {
	let fakes = Fakes::new();
	let (app, state) = app(&fakes);
	let (status, body) = send(
		&app,
		post_json(
			"/v1/events",
			json!({ "topic": "snippet.created", "payload": { "id": "s1", "code": "fn a() {}" } }),
		),
	)
	.await;

	assert_eq!(status, StatusCode::ACCEPTED);
	assert_eq!(body["outcome"], "started");
	assert_eq!(body["run_id"], "snippet-ingestion-s1");

	state.runtime.wait("snippet-ingestion-s1").await.expect("Run must be known.");

	let (status, body) = send(&app, get("/v1/runs/snippet-ingestion-s1")).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["run_id"], "snippet-ingestion-s1");
	assert_eq!(body["status"], "completed");
	assert_eq!(body["result"]["kind"], "ingestion");
	assert!(fakes.store.get("s1").is_some());
}

#[tokio::test]
async fn repeated_event_while_running_is_already_running() {
	let fakes = Fakes::new();
	let (app, state) = app(&fakes);
	let event = json!({ "topic": "snippet.updated", "payload": { "id": 7, "code": "x = 1" } });

	fakes.summarizer.gate.close();

	let (_, first) = send(&app, post_json("/v1/events", event.clone())).await;
	let (status, second) = send(&app, post_json("/v1/events", event)).await;

	assert_eq!(first["outcome"], "started");
	assert_eq!(status, StatusCode::ACCEPTED);
	assert_eq!(second["outcome"], "already_running");
	assert_eq!(second["run_id"], "snippet-ingestion-7");

	fakes.summarizer.gate.open();
	state.runtime.wait("snippet-ingestion-7").await.expect("Run must be known.");
}

#[tokio::test]
async fn invalid_payload_is_unprocessable() {
	let fakes = Fakes::new();
	let (app, _) = app(&fakes);
	let (status, body) = send(
		&app,
		post_json("/v1/events", json!({ "topic": "snippet.created", "payload": { "id": "s1" } })),
	)
	.await;

	assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
	assert_eq!(body["error_code"], "invalid_payload");
	assert_eq!(body["fields"][0], "snippet.created.payload");
	assert!(fakes.store.is_empty());
}

#[tokio::test]
async fn unknown_topic_is_ignored() {
	let fakes = Fakes::new();
	let (app, _) = app(&fakes);
	let (status, body) =
		send(&app, post_json("/v1/events", json!({ "topic": "snippet.deleted" }))).await;

	assert_eq!(status, StatusCode::ACCEPTED);
	assert_eq!(body["outcome"], "ignored");
	assert_eq!(body["topic"], "snippet.deleted");
}

#[tokio::test]
async fn unknown_runs_are_not_found() {
	let fakes = Fakes::new();
	let (app, _) = app(&fakes);
	let (status, body) = send(&app, get("/v1/runs/snippet-ingestion-nope")).await;

	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(body["error_code"], "run_not_found");

	let (status, _) =
		send(&app, post_json("/v1/runs/snippet-ingestion-nope/cancel", Value::Null)).await;

	assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_stops_a_running_ingestion() {
	let fakes = Fakes::new();
	let (app, state) = app(&fakes);

	fakes.summarizer.gate.close();

	send(
		&app,
		post_json(
			"/v1/events",
			json!({ "topic": "snippet.created", "payload": { "id": "s2", "code": "y = 2" } }),
		),
	)
	.await;

	let (status, body) = send(&app, get("/v1/runs/snippet-ingestion-s2")).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["status"], "running");

	let (status, body) =
		send(&app, post_json("/v1/runs/snippet-ingestion-s2/cancel", Value::Null)).await;

	assert_eq!(status, StatusCode::ACCEPTED);
	assert_eq!(body["cancel_requested"], true);

	fakes.summarizer.gate.open();
	state.runtime.wait("snippet-ingestion-s2").await.expect("Run must be known.");

	let (_, body) = send(&app, get("/v1/runs/snippet-ingestion-s2")).await;

	assert_eq!(body["status"], "cancelled");
	assert!(fakes.store.is_empty());
}

#[tokio::test]
async fn repository_event_crawls_and_file_runs_are_addressable() {
	let tree = FakeTree::new()
		.dir("", [TreeNode::file("src/a.rs")])
		.file("src/a.rs", "fn a() {}");
	let fakes = Fakes::with_tree(tree);
	let (app, state) = app(&fakes);
	let (status, body) = send(
		&app,
		post_json(
			"/v1/events",
			json!({ "topic": "repository.cloned", "payload": { "identifier": "acme" } }),
		),
	)
	.await;

	assert_eq!(status, StatusCode::ACCEPTED);
	assert_eq!(body["run_id"], "repository-ingestion-acme");

	state.runtime.wait("repository-ingestion-acme").await.expect("Crawl must be known.");
	state.runtime.wait("repo-file:acme:src/a.rs").await.expect("File run must be known.");

	let (status, body) = send(&app, get("/v1/runs/repo-file:acme:src%2Fa.rs")).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["run_id"], "repo-file:acme:src/a.rs");
	assert_eq!(body["status"], "completed");
}

#[tokio::test]
async fn events_after_shutdown_are_unavailable() {
	let fakes = Fakes::new();
	let (app, state) = app(&fakes);

	state.runtime.shutdown();

	let (status, body) = send(
		&app,
		post_json(
			"/v1/events",
			json!({ "topic": "snippet.created", "payload": { "id": "s3", "code": "z" } }),
		),
	)
	.await;

	assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
	assert_eq!(body["error_code"], "shutting_down");
}
