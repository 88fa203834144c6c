pub mod builders;
pub mod fakes;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Upper bound for a single async test step.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Install a test subscriber once per test binary.
///
/// Output goes through the test writer, so it only shows up for failing
/// tests (or with `--nocapture`). The filter comes from `INCBUILD_LOG`, then
/// `RUST_LOG`, and defaults to warnings plus the build log lines:
/// `INCBUILD_LOG=incbuild=debug cargo test --test coordinator`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = [incbuild::logging::LOG_ENV_VAR, "RUST_LOG"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find_map(|directive| EnvFilter::try_new(directive.trim()).ok())
            .unwrap_or_else(|| EnvFilter::new("warn,incbuild::build_log=info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Await `f`, failing the test if it takes longer than [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(value) => value,
        Err(_) => panic!("test step timed out after {:?}", TEST_TIMEOUT),
    }
}
