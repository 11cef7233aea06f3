use std::sync::Once;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static TEST_TRACING: Once = Once::new();

/// Initializes the global tracing subscriber for a pipeline process.
///
/// Filtering follows `RUST_LOG`, defaulting to `info` when unset. Panics if a
/// global subscriber is already installed, which indicates a double
/// initialization bug in the caller.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initializes tracing for tests.
///
/// Safe to call from every test; only the first call installs a subscriber.
/// Output goes through the test writer so it interleaves correctly with
/// `cargo test` capture.
pub fn init_test_tracing() {
    TEST_TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}
