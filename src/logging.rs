//! Logging setup

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Level used before the config file has been read
const BOOTSTRAP_LEVEL: &str = "warn";

/// Build the filter: `RUST_LOG` wins over the configured level
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("campusconnect={}", config.level)))
}

/// Install the global subscriber
///
/// `format = "json"` emits one JSON object per line; anything else is
/// human-readable output. Fails if a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    if config.format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    }
}

/// Subscriber for the window before the config is loaded
pub fn bootstrap_subscriber<W>(make_writer: W) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("campusconnect={}", BOOTSTRAP_LEVEL)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .with_ansi(false)
        .finish()
}

/// Run `f` with warnings going to stderr, for config loading
///
/// Call before [`init_logging`]; the global subscriber is not touched.
pub fn with_bootstrap_logging<T>(f: impl FnOnce() -> T) -> T {
    tracing::subscriber::with_default(bootstrap_subscriber(std::io::stderr), f)
}
