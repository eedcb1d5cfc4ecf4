//! Logging initialization using the `tracing` ecosystem.
//!
//! Console output is human-readable. File output, when a directory is given,
//! rotates daily and is written as one JSON object per line so that feed
//! logs can be grepped by field (`target`, `threadId`, message).
//!
//! The level comes from `RUST_LOG` when set, else from the caller.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Build the level filter: `RUST_LOG` wins over `fallback`.
fn level_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// - `log_level`: used when `RUST_LOG` is unset (e.g. `"info"`,
///   `"hb_feed=debug,info"`); an unparsable value falls back to `info`
/// - `log_dir`: directory for daily-rotating JSON log files
/// - `module_name`: log file prefix (e.g. `"hitbtc_feed"`)
///
/// A second call is a no-op.
pub fn init_logging(log_level: &str, log_dir: Option<&str>, module_name: &str) {
    let console = fmt::layer().with_target(true).with_thread_ids(true);

    let file = log_dir.map(|dir| {
        fmt::layer()
            .json()
            .with_writer(tracing_appender::rolling::daily(dir, module_name))
            .with_ansi(false)
            .with_thread_ids(true)
            .with_current_span(false)
    });

    // Option<Layer> is itself a layer; `None` adds nothing.
    let _ = tracing_subscriber::registry()
        .with(level_filter(log_level))
        .with(console)
        .with(file)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_level_falls_back_instead_of_panicking() {
        let _ = level_filter("not a level ===");
    }

    #[test]
    fn repeated_init_is_harmless() {
        init_logging("debug", None, "hitbtc_feed");
        init_logging("info", None, "hitbtc_feed");
    }
}
