//! Process-wide `tracing` subscriber.
use crate::configuration::LogSettings;
use anyhow::Context;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the filter in `settings`.
/// It fails if a global subscriber was already installed.
pub fn init_subscriber(settings: &LogSettings) -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .with_context(|| format!("Invalid log filter directive '{}'", settings.filter))?;
    let registry = tracing_subscriber::registry().with(filter);

    let outcome = if settings.json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
    outcome.context("Failed to install the global tracing subscriber")
}
