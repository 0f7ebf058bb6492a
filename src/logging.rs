use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Installs a stderr subscriber filtered by `RUST_LOG`, `warn` when unset.
///
/// `RUST_LOG=gridkit::state::window=debug` traces window fetches,
/// `RUST_LOG=gridkit=debug` everything in the crate.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .with_filter(filter);

    // A second init (tests, embedding hosts) keeps the first subscriber.
    let _ = tracing_subscriber::registry().with(console_layer).try_init();
}
