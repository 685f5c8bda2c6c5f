use crate::config::EngineConfig;
use once_cell::sync::OnceCell;
use tracing::debug;

static GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Installs the global file subscriber. Calling it again is a no-op.
pub fn init_logging(config: &EngineConfig) {
    if GUARD.get().is_some() {
        return;
    }
    let log_dir = &config.log_dir;
    if let Err(e) = std::fs::create_dir_all(log_dir) {
        eprintln!("Failed to create log dir {:?}: {}", log_dir, e);
        return;
    }
    let file_appender = tracing_appender::rolling::never(log_dir, "fileops.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    if GUARD.set(guard).is_err() {
        return;
    }
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .from_env_lossy();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(non_blocking);
    if let Err(e) = subscriber.try_init() {
        eprintln!("Failed to init tracing subscriber: {e}");
    }

    debug!(
        log_dir = %log_dir.display(),
        trash_dir = %config.trash_dir.display(),
        "logging initialized"
    );
}
