use std::{future::Future, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};
use tokio::time;

use crate::{
	Error, FailureKind, Result, RunContext, StepConfig, StepError, StepJournal, TerminalFailure,
};

/// Runs named steps with a per-attempt timeout, bounded retries and journal replay.
pub struct StepExecutor {
	journal: Arc<dyn StepJournal>,
}
impl StepExecutor {
	pub fn new(journal: Arc<dyn StepJournal>) -> Self {
		Self { journal }
	}

	pub fn journal(&self) -> &Arc<dyn StepJournal> {
		&self.journal
	}

	/// Returns the journaled result of `step_key` for this run if there is one. Otherwise invokes
	/// `op` until it succeeds, fails non-retryably, or exhausts `config.retry.max_attempts`.
	pub async fn execute<T, F, Fut>(
		&self,
		ctx: &RunContext,
		step_key: &str,
		config: &StepConfig,
		mut op: F,
	) -> Result<T>
	where
		T: Serialize + DeserializeOwned,
		F: FnMut() -> Fut,
		Fut: Future<Output = std::result::Result<T, StepError>>,
	{
		if let Some(recorded) = self.journal.load(&ctx.run_id, step_key) {
			match serde_json::from_value(recorded) {
				Ok(value) => {
					tracing::debug!(
						run_id = %ctx.run_id,
						step = step_key,
						"Step replayed from journal."
					);

					return Ok(value);
				},
				Err(err) => tracing::warn!(
					run_id = %ctx.run_id,
					step = step_key,
					error = %err,
					"Journaled step result is unreadable. Re-running step."
				),
			}
		}

		let max_attempts = config.retry.max_attempts.max(1);
		let mut attempt = 0;

		loop {
			ctx.ensure_active()?;

			attempt += 1;

			let outcome = match time::timeout(config.timeout, op()).await {
				Ok(outcome) => outcome,
				Err(_) => Err(StepError::new(
					FailureKind::TimedOut,
					format!("Attempt exceeded {}ms.", config.timeout.as_millis()),
				)),
			};
			let err = match outcome {
				Ok(value) => {
					self.record(ctx, step_key, &value);

					return Ok(value);
				},
				Err(err) => err,
			};

			if !err.kind.is_retryable() || attempt >= max_attempts {
				tracing::error!(
					run_id = %ctx.run_id,
					step = step_key,
					attempt,
					kind = ?err.kind,
					error = %err.message,
					"Step failed terminally."
				);

				return Err(Error::Step(TerminalFailure {
					step: step_key.to_string(),
					attempts: attempt,
					kind: err.kind,
					message: err.message,
				}));
			}

			let backoff = config.retry.backoff_for_attempt(attempt);

			tracing::warn!(
				run_id = %ctx.run_id,
				step = step_key,
				attempt,
				backoff_ms = backoff.as_millis() as u64,
				error = %err.message,
				"Step attempt failed. Retrying."
			);

			tokio::select! {
				_ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
				_ = time::sleep(backoff) => {},
			}
		}
	}

	fn record<T>(&self, ctx: &RunContext, step_key: &str, value: &T)
	where
		T: Serialize,
	{
		match serde_json::to_value(value) {
			Ok(json) => self.journal.record(&ctx.run_id, step_key, json),
			Err(err) => tracing::warn!(
				run_id = %ctx.run_id,
				step = step_key,
				error = %err,
				"Step result is not serializable. Skipping journal entry."
			),
		}
	}
}
