use color_eyre::eyre::eyre;
use color_eyre::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dontforget=info,warn"))
}

/// Log to stderr, for the one-shot commands.
pub fn init_stderr() {
  tracing_subscriber::fmt()
    .with_env_filter(env_filter())
    .with_writer(std::io::stderr)
    .with_target(false)
    .init();
}

/// Log to a daily file under the cache directory, for the terminal menu.
///
/// Keep the guard alive until exit or buffered lines are lost.
pub fn init_file() -> Result<WorkerGuard> {
  let dir = dirs::cache_dir()
    .ok_or_else(|| eyre!("Could not determine cache directory"))?
    .join("dontforget")
    .join("logs");
  std::fs::create_dir_all(&dir)?;

  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(
    &dir,
    "dontforget.log",
  ));

  tracing_subscriber::fmt()
    .with_env_filter(env_filter())
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}
