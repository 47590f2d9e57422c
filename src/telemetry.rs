use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSettings;

/// Filter used when neither `RUST_LOG` nor `logging.filter` is set.
pub const DEFAULT_FILTER: &str = "info,podcast_pipeline=debug";

/// Filter directive in effect: `RUST_LOG`, then the configured filter, then
/// [`DEFAULT_FILTER`].
pub fn env_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = settings.filter.as_deref().unwrap_or(DEFAULT_FILTER);
        EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    })
}

/// Install the global subscriber. Call once, from `main`.
pub fn init_tracing(settings: &LoggingSettings) {
    let filter = env_filter(settings);

    if settings.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_line_number(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }

    tracing::debug!(json = settings.json, "tracing initialized");
}
