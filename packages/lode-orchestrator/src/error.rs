use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::Serialize;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
	/// Unavailable, rate limited, or otherwise transient.
	Retryable,
	/// The attempt ran past its step timeout. Retried like [`FailureKind::Retryable`].
	TimedOut,
	/// Malformed input or a schema mismatch. Never retried.
	Fatal,
	/// The requested file or path does not exist. Never retried.
	NotFound,
}
impl FailureKind {
	pub fn is_retryable(self) -> bool {
		matches!(self, Self::Retryable | Self::TimedOut)
	}
}

/// Failure of a single step attempt, classified for the retry loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StepError {
	pub kind: FailureKind,
	pub message: String,
}
impl StepError {
	pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
		Self { kind, message: message.into() }
	}

	pub fn retryable(message: impl Into<String>) -> Self {
		Self::new(FailureKind::Retryable, message)
	}

	pub fn fatal(message: impl Into<String>) -> Self {
		Self::new(FailureKind::Fatal, message)
	}

	pub fn not_found(message: impl Into<String>) -> Self {
		Self::new(FailureKind::NotFound, message)
	}
}
impl From<lode_providers::Error> for StepError {
	fn from(err: lode_providers::Error) -> Self {
		let kind = if err.is_not_found() {
			FailureKind::NotFound
		} else if err.is_timeout() {
			FailureKind::TimedOut
		} else if err.is_retryable() {
			FailureKind::Retryable
		} else {
			FailureKind::Fatal
		};

		Self::new(kind, err.to_string())
	}
}
impl From<lode_storage::Error> for StepError {
	fn from(err: lode_storage::Error) -> Self {
		let kind = if err.is_retryable() { FailureKind::Retryable } else { FailureKind::Fatal };

		Self::new(kind, err.to_string())
	}
}
impl From<lode_domain::Error> for StepError {
	fn from(err: lode_domain::Error) -> Self {
		Self::fatal(err.to_string())
	}
}

/// A step that will not be attempted again. Fails the owning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TerminalFailure {
	pub step: String,
	pub attempts: u32,
	pub kind: FailureKind,
	pub message: String,
}
impl Display for TerminalFailure {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		write!(
			f,
			"Step {} failed after {} attempt(s) ({:?}): {}",
			self.step, self.attempts, self.kind, self.message
		)
	}
}
impl std::error::Error for TerminalFailure {}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Step(#[from] TerminalFailure),
	#[error("Run was cancelled.")]
	Cancelled,
	#[error("Run exceeded its {limit_ms}ms deadline.")]
	TimedOut { limit_ms: u64 },
	#[error("Invalid input: {0}")]
	InvalidInput(#[from] lode_domain::Error),
	#[error("Runtime is shutting down.")]
	ShuttingDown,
	#[error("{message}")]
	Setup { message: String },
}
