//! Process-wide `tracing` subscriber.

use tether_settings::LoggingSettings;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter from `RUST_LOG` if set, otherwise from the configured level.
pub fn env_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level))
}

/// Install the global subscriber. Call once at startup.
pub fn init(settings: &LoggingSettings) -> anyhow::Result<()> {
    let filter = env_filter(settings);
    if settings.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_list(true),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_uses_configured_level() {
        let settings = LoggingSettings {
            level: "tether_server=debug,warn".into(),
            json: false,
        };
        // RUST_LOG may be set by the harness; only check the fallback parses.
        let filter = env_filter(&settings).to_string();
        assert!(!filter.is_empty());
    }
}
