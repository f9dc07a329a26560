//! Process-wide logger setup shared by every LAIA binary.

use env_logger::{Builder, Env};

/// Install the `env_logger` backend once; `RUST_LOG` overrides `default_level`.
///
/// Safe to call repeatedly (tests, embedded front-ends): later calls are ignored.
pub fn init(default_level: &str) {
    let env = Env::default().default_filter_or(default_level);
    let _ = Builder::from_env(env)
        .format_timestamp_secs()
        .format_target(false)
        .try_init();
}
