use std::sync::Arc;

use lode_orchestrator::{
	Collaborators, MemoryJournal, Pipeline, Runtime, RuntimeSettings, StepTable, TriggerListener,
};

#[derive(Clone)]
pub struct AppState {
	pub runtime: Runtime,
	pub listener: Arc<TriggerListener>,
}
impl AppState {
	/// Builds the production collaborators and starts the runtime. Must be called inside a Tokio
	/// runtime.
	pub fn new(config: &lode_config::Config) -> color_eyre::Result<Self> {
		let collaborators = Collaborators::from_config(config)?;
		let pipeline = Pipeline::new(
			collaborators,
			Arc::new(MemoryJournal::new()),
			StepTable::from(&config.steps),
			config.runtime.parallel_chunking,
		);
		let runtime = Runtime::new(pipeline, RuntimeSettings::from(&config.runtime));

		Ok(Self::with_runtime(runtime))
	}

	pub fn with_runtime(runtime: Runtime) -> Self {
		let listener = Arc::new(TriggerListener::new(Arc::new(runtime.launcher())));

		Self { runtime, listener }
	}
}
