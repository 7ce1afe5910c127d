//! Tracing subscriber setup.

use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "vitalsync=info";

/// Directory for rolling log files: `<data dir>/vitalsync/logs`.
pub fn default_log_dir() -> Option<PathBuf> {
  dirs::data_dir().map(|d| d.join("vitalsync").join("logs"))
}

/// Install the global subscriber.
///
/// Console output goes to stderr, filtered by `RUST_LOG` (default
/// `vitalsync=info`). With a `log_dir`, a daily rolling file is written too;
/// keep the returned guard alive until exit so buffered lines are flushed.
pub fn init(log_dir: Option<PathBuf>) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

  let console = fmt::layer().with_target(false).with_writer(std::io::stderr);

  let (file, guard) = match log_dir {
    Some(dir) => {
      std::fs::create_dir_all(&dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
      let appender = tracing_appender::rolling::daily(dir, "vitalsync.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      let layer = fmt::layer().with_ansi(false).with_writer(writer);
      (Some(layer), Some(guard))
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(console)
    .with(file)
    .try_init()
    .map_err(|e| eyre!("Failed to set logger: {}", e))?;

  Ok(guard)
}
