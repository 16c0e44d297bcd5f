use std::time::Duration;

/// Attempt budget and exponential backoff for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub initial_interval: Duration,
	pub max_interval: Duration,
}
impl RetryPolicy {
	/// Delay after the `attempt`-th failure (1-based): the initial interval doubled per prior
	/// failure and capped at the maximum.
	pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
		let exp = attempt.max(1).saturating_sub(1).min(16);
		let base = self.initial_interval.saturating_mul(1 << exp);

		base.min(self.max_interval)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepConfig {
	pub timeout: Duration,
	pub retry: RetryPolicy,
}
impl From<&lode_config::StepPolicy> for StepConfig {
	fn from(policy: &lode_config::StepPolicy) -> Self {
		Self {
			timeout: Duration::from_millis(policy.timeout_ms),
			retry: RetryPolicy {
				max_attempts: policy.max_attempts,
				initial_interval: Duration::from_millis(policy.initial_interval_ms),
				max_interval: Duration::from_millis(policy.max_interval_ms),
			},
		}
	}
}

/// Timeout and retry settings for every named step.
#[derive(Debug, Clone)]
pub struct StepTable {
	pub summarize: StepConfig,
	pub embed_summary: StepConfig,
	pub chunk: StepConfig,
	pub summarize_chunks: StepConfig,
	pub embed_chunk_summaries: StepConfig,
	pub index: StepConfig,
	pub list: StepConfig,
	pub fetch: StepConfig,
}
impl From<&lode_config::Steps> for StepTable {
	fn from(steps: &lode_config::Steps) -> Self {
		Self {
			summarize: (&steps.summarize).into(),
			embed_summary: (&steps.embed_summary).into(),
			chunk: (&steps.chunk).into(),
			summarize_chunks: (&steps.summarize_chunks).into(),
			embed_chunk_summaries: (&steps.embed_chunk_summaries).into(),
			index: (&steps.index).into(),
			list: (&steps.list).into(),
			fetch: (&steps.fetch).into(),
		}
	}
}
impl Default for StepTable {
	fn default() -> Self {
		Self::from(&lode_config::Steps::default())
	}
}
