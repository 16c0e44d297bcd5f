use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = lode_worker::Args::parse();

	lode_worker::run(args).await
}
