//! Tracing subscriber setup for binaries and test harnesses.

use tracing_subscriber::EnvFilter;

use crate::config::env_vars;

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `devlink=info` (or `debug` when
/// `verbose`). Logs go to stderr, as JSON when `DEVLINK_LOG_JSON=true`.
/// Returns `false` if a subscriber was already installed.
pub fn init(verbose: bool) -> bool {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("devlink={}", default_level)))
        .add_directive(tracing::Level::WARN.into());

    let json_logging = std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_writer(std::io::stderr)
            .compact()
            .try_init()
            .is_ok()
    }
}
