//! Tracing subscriber setup for embedders and tests

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Install a compact fmt subscriber at `level`
///
/// `RUST_LOG` takes precedence when set. Returns false if a global
/// subscriber was already installed.
pub fn init(level: Level) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("animestream={}", level.as_str().to_lowercase())));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .is_ok()
}

/// Level for a verbosity count (0 = warn, 1 = info, 2 = debug, 3+ = trace)
pub fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}
