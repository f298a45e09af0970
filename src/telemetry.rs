//! Tracing subscriber setup

use crate::config::MonitoringConfig;

/// Install the global fmt subscriber. `RUST_LOG` wins over the configured level.
///
/// Returns `false` when a subscriber was already installed, which makes repeated
/// calls (for example from several tests) harmless.
pub fn init_tracing(config: &MonitoringConfig) -> bool {
    let default_filter = format!("lotto_engine={}", config.log_level.as_filter());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_target(true)
        .try_init()
        .is_ok()
}
