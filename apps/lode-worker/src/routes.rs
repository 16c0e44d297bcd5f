//! Run identities may contain `/`; clients percent-encode them in the `{run_id}` segment.

use axum::{
	Json, Router,
	extract::{Path, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::Serialize;

use lode_orchestrator::{Error, RunStatus, TriggerError, TriggerEvent, TriggerOutcome};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/events", post(publish_event))
		.route("/v1/runs/{run_id}", get(run_status))
		.route("/v1/runs/{run_id}/cancel", post(cancel_run))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn publish_event(
	State(state): State<AppState>,
	Json(event): Json<TriggerEvent>,
) -> Result<(StatusCode, Json<TriggerOutcome>), ApiError> {
	let outcome = state.listener.handle(&event).await?;

	Ok((StatusCode::ACCEPTED, Json(outcome)))
}

#[derive(Debug, Serialize)]
pub struct RunView {
	pub run_id: String,
	#[serde(flatten)]
	pub status: RunStatus,
}

async fn run_status(
	State(state): State<AppState>,
	Path(run_id): Path<String>,
) -> Result<Json<RunView>, ApiError> {
	let status = state.runtime.status(&run_id).ok_or_else(|| unknown_run(&run_id))?;

	Ok(Json(RunView { run_id, status }))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
	pub run_id: String,
	pub cancel_requested: bool,
}

async fn cancel_run(
	State(state): State<AppState>,
	Path(run_id): Path<String>,
) -> Result<(StatusCode, Json<CancelResponse>), ApiError> {
	if !state.runtime.cancel(&run_id) {
		return Err(unknown_run(&run_id));
	}

	Ok((StatusCode::ACCEPTED, Json(CancelResponse { run_id, cancel_requested: true })))
}

fn unknown_run(run_id: &str) -> ApiError {
	ApiError::new(StatusCode::NOT_FOUND, "run_not_found", format!("Run {run_id} is unknown."), None)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}
impl From<TriggerError> for ApiError {
	fn from(err: TriggerError) -> Self {
		match err {
			TriggerError::InvalidPayload { topic, message } => Self::new(
				StatusCode::UNPROCESSABLE_ENTITY,
				"invalid_payload",
				message,
				Some(vec![format!("{topic}.payload")]),
			),
			TriggerError::Launch(Error::ShuttingDown) => Self::new(
				StatusCode::SERVICE_UNAVAILABLE,
				"shutting_down",
				"The worker is shutting down.",
				None,
			),
			TriggerError::Launch(err) => {
				tracing::error!(error = %err, "Failed to launch run.");

				Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", err.to_string(), None)
			},
		}
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}
