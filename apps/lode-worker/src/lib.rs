//! HTTP front of the ingestion runtime: bus events in, run status and cancellation out.

pub mod cli;
pub mod routes;
pub mod state;

pub use cli::Args;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = lode_config::load(&args.config)?;

	init_tracing(&config);

	let http_addr: SocketAddr = config.service.http_bind.parse()?;
	let state = AppState::new(&config)?;
	let runtime = state.runtime.clone();
	let app = routes::router(state);
	let listener = TcpListener::bind(http_addr).await?;

	tracing::info!(%http_addr, "HTTP server listening.");

	axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

	runtime.shutdown();

	tracing::info!("Worker stopped.");

	Ok(())
}

fn init_tracing(config: &lode_config::Config) {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
	if let Err(err) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %err, "Failed to listen for shutdown signal.");

		return;
	}

	tracing::info!("Shutdown signal received.");
}
