use std::path::PathBuf;

use clap::Parser;

/// Command-line arguments for the room synchronization engine.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
	/// Path to a TOML configuration file. Values are overridden by
	/// `SYNQIT_`-prefixed environment variables.
	#[arg(short, long)]
	pub config: Option<PathBuf>,

	/// Validates configuration and exits without starting the server.
	#[arg(long)]
	pub check_config: bool,

	/// Overrides the `log` filter directives loaded from the config file.
	#[arg(long)]
	pub log: Option<String>,
}

#[must_use]
pub fn parse() -> Args { Args::parse() }
