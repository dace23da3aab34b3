use std::fs;
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes console logging plus a daily-rotated JSON log under `log_dir`.
///
/// `RUST_LOG` refines the default `marker_reconciler=info` directive.
pub fn init_logging(log_dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "reconcile.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stdout);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("marker_reconciler=info".parse()?))
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    // Flushes on drop; the subscriber lives for the whole process
    std::mem::forget(guard);
    Ok(())
}
