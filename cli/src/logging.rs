use anyhow::Context;
use archivist_core::api::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_FILE_PREFIX: &str = "archivist.log";

/// Console logging on stderr, plus a daily file when `cfg.dir` is set.
///
/// `RUST_LOG` wins over the configured level. Keep the returned guard alive
/// until exit so buffered file output is flushed.
pub fn init(cfg: &LoggingConfig, verbose: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = if verbose {
        EnvFilter::new("archivist=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level))
    };
    let console = fmt::layer().with_writer(std::io::stderr).with_target(true);

    match &cfg.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log dir {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .try_init()
                .context("failed to install tracing subscriber")?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .try_init()
                .context("failed to install tracing subscriber")?;
            Ok(None)
        }
    }
}
