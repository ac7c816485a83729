use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs a stderr subscriber so command output on stdout stays clean.
/// `RUST_LOG` takes precedence over `level`.
pub fn init_logging(level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    // Ignore error if a global subscriber is already set
    let _ = tracing::subscriber::set_global_default(subscriber);
}
