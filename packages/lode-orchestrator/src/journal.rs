//! Completed step results keyed by `(run_id, step_key)`. The executor consults the journal before
//! invoking a collaborator so that a re-executed step replays its recorded result.

use std::{collections::HashMap, sync::Mutex};

use serde_json::Value;

pub trait StepJournal
where
	Self: Send + Sync,
{
	fn load(&self, run_id: &str, step_key: &str) -> Option<Value>;

	fn record(&self, run_id: &str, step_key: &str, value: Value);

	/// Drops every entry of a run that reached a terminal status.
	fn clear_run(&self, run_id: &str);
}

#[derive(Debug, Default)]
pub struct MemoryJournal {
	entries: Mutex<HashMap<String, HashMap<String, Value>>>,
}
impl MemoryJournal {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn entries_for(&self, run_id: &str) -> usize {
		let entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		entries.get(run_id).map(HashMap::len).unwrap_or(0)
	}
}
impl StepJournal for MemoryJournal {
	fn load(&self, run_id: &str, step_key: &str) -> Option<Value> {
		let entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		entries.get(run_id).and_then(|steps| steps.get(step_key)).cloned()
	}

	fn record(&self, run_id: &str, step_key: &str, value: Value) {
		let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		entries.entry(run_id.to_string()).or_default().insert(step_key.to_string(), value);
	}

	fn clear_run(&self, run_id: &str) {
		let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		entries.remove(run_id);
	}
}
