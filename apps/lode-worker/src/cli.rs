use std::path::PathBuf;

use clap::{
	Parser,
	builder::{
		Styles,
		styling::{AnsiColor, Effects},
	},
};

pub const VERSION: &str = concat!(
	env!("CARGO_PKG_VERSION"),
	"-",
	env!("VERGEN_GIT_SHA"),
	"-",
	env!("VERGEN_CARGO_TARGET_TRIPLE"),
);

#[derive(Debug, Parser)]
#[command(
	version = VERSION,
	about = "Ingests code artifacts into a vector store on bus events.",
	rename_all = "kebab",
	styles = styles(),
)]
pub struct Args {
	/// TOML config file.
	#[arg(long, short = 'c', value_name = "FILE", env = "LODE_CONFIG")]
	pub config: PathBuf,
}

fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Magenta.on_default() | Effects::BOLD)
		.usage(AnsiColor::Magenta.on_default() | Effects::BOLD)
		.literal(AnsiColor::Cyan.on_default())
		.placeholder(AnsiColor::Yellow.on_default())
		.error(AnsiColor::Red.on_default() | Effects::BOLD)
}

#[cfg(test)]
mod tests {
	use clap::CommandFactory;

	use super::*;

	#[test]
	fn args_are_well_formed() {
		Args::command().debug_assert();
	}

	#[test]
	fn config_accepts_short_flag() {
		let args = Args::try_parse_from(["lode-worker", "-c", "lode.toml"])
			.expect("Short config flag must parse.");

		assert_eq!(args.config, PathBuf::from("lode.toml"));
	}
}
