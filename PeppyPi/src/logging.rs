//! Console logging setup.
//!
//! `RUST_LOG` wins when set; otherwise the filter comes from
//! `host.logger.min_level`.

use peppyconfig::Config;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_logging(config: &Config) {
    let level = config
        .get_log_min_level()
        .unwrap_or_else(|_| "INFO".to_string());

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let enable_console = config.get_log_enable_console().unwrap_or(true);

    let subscriber = Registry::default().with(filter);
    if enable_console {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .init();
    } else {
        subscriber.init();
    }
}
