mod commands;
mod logging;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use taskboard::api::ApiClient;
use taskboard::config::Config;

#[derive(Parser, Debug)]
#[command(name = "taskboard")]
#[command(about = "A command-line client for the project-management API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/taskboard/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init()?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  tracing::info!(base_url = %config.api.base_url, "starting");

  let client = ApiClient::new(&config)?;
  commands::run(args.command, &client, &config).await?;

  Ok(())
}
