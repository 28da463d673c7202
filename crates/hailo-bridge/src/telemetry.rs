use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer};

/// Install a global `fmt` subscriber filtered by `filter`.
///
/// The library never calls this itself; hosts opt in once at startup. Fails if a
/// global subscriber is already installed.
pub fn init_tracing(filter: &str) -> Result<(), TryInitError> {
    let stdout_layer = fmt::layer()
        .with_target(true)
        .with_filter(EnvFilter::new(filter));
    tracing_subscriber::registry()
        .with(stdout_layer)
        .try_init()
}
