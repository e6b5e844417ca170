use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const DEFAULT_LOG_LEVEL: &str = "info,joke_market_engine=debug,tower_http=debug,hyper=info";

/// Human readable logs on stdout, filtered by `RUST_LOG` when it is set.
pub fn setup_telemetry() {
    let stdout_log = tracing_subscriber::fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(
            stdout_log.with_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_LEVEL.into()),
            ),
        )
        .init();
}
