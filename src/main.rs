mod api;
mod app;
mod cache;
mod clients;
mod commands;
mod config;
mod db;
mod event;
mod net;
mod notify;
mod queue;
#[cfg(test)]
mod testing;
mod worker;

use clap::Parser;
use color_eyre::Result;
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "expense-sync")]
#[command(about = "Offline cache and background sync for the expense tracker")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/expense-sync/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Origin the app is served from
  #[arg(short, long, global = true)]
  origin: Option<String>,

  #[command(subcommand)]
  command: commands::Command,
}

/// Log to stderr, and to a daily file under `log_dir` when configured.
///
/// The returned guard flushes the file writer and must outlive the program.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
  // RUST_LOG overrides the default level
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  let (file_layer, guard) = match log_dir {
    Some(dir) => {
      let appender = tracing_appender::rolling::daily(dir, "expense-sync.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      (
        Some(fmt::layer().with_writer(writer).with_ansi(false)),
        Some(guard),
      )
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(io::stderr))
    .with(file_layer)
    .with(filter)
    .init();

  guard
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override origin if specified on command line
  let config = if let Some(origin) = args.origin {
    config::Config { origin, ..config }
  } else {
    config
  };

  let _guard = init_tracing(config.log_dir.as_deref());

  let app = app::App::new(config)?;
  let result = app.run(args.command).await;
  app.shutdown().await;

  result
}
