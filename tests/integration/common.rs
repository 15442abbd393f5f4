//! Shared test support.

use std::sync::Arc;
use std::sync::Once;

use deferred_helpers::engine::{Engine, EngineOptions, InstanceAllocator};
use deferred_helpers::token::DEFAULT_PREFIX;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Initialize tracing for tests, once per process.
///
/// Honors `RUST_LOG` when set; stays silent otherwise.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        if std::env::var("RUST_LOG").is_err() {
            return;
        }
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Engine with a fresh allocator so instance ids start at zero.
pub fn pinned_engine() -> Engine {
    pinned_engine_with_prefix(DEFAULT_PREFIX)
}

/// Engine with a fresh allocator and an explicit token prefix.
pub fn pinned_engine_with_prefix(prefix: &str) -> Engine {
    Engine::with_options(EngineOptions {
        prefix: prefix.to_string(),
        allocator: Arc::new(InstanceAllocator::new()),
    })
}

/// Two engines sharing one fresh allocator (instance ids 0 and 1).
pub fn pinned_engine_pair() -> (Engine, Engine) {
    let allocator = Arc::new(InstanceAllocator::new());
    let opts = |allocator: Arc<InstanceAllocator>| EngineOptions {
        prefix: DEFAULT_PREFIX.to_string(),
        allocator,
    };
    let a = Engine::with_options(opts(allocator.clone()));
    let b = Engine::with_options(opts(allocator));
    (a, b)
}
