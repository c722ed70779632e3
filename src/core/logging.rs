use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::config::LoggingConfig;

const LOG_FILE_NAME: &str = "trailing-profit.log";

/// Install the global subscriber. The returned guard must be held for the
/// life of the process or buffered file output is lost.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (file_layer, guard) = match config.dir.as_deref() {
        // rolling::daily panics if the directory cannot be created
        Some(dir) if std::fs::create_dir_all(dir).is_ok() => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        Some(dir) => {
            eprintln!("Could not create log directory {}, file logging disabled", dir);
            (None, None)
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .init();

    tracing::info!("Logging initialized at level: {}", config.level);
    if let Some(dir) = config.dir.as_deref() {
        tracing::info!("Writing daily logs to {}/{}", dir, LOG_FILE_NAME);
    }

    guard
}
