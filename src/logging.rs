use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. `RUST_LOG` overrides `default_level`.
///
/// Log lines go to stderr so JSON reports on stdout stay machine-readable. Calling this twice is
/// harmless; the second subscriber is ignored.
pub fn init_tracing(default_level: &str) {
    let default_filter = format!("projection={default_level}");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}
