//! Tracing initialisation for the `mespack` binary.
//!
//! [`init_tracing`] configures the global subscriber once per process;
//! later calls are ignored. Without `RUST_LOG`, mespack's own crates log at
//! the requested level while the HTTP and TLS stack stays at `warn`.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Filter directives used when `RUST_LOG` is unset. Targets of every
/// `mespack_*` crate share the `mespack` prefix.
pub fn default_directives(level: Level) -> String {
    format!("warn,mespack={}", level.as_str().to_ascii_lowercase())
}

/// Install the global subscriber, writing to stderr. With `json`, events are
/// newline-delimited JSON.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let output = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let output = if json {
        output.json().boxed()
    } else {
        output.boxed()
    };

    tracing_subscriber::registry()
        .with(output.with_filter(filter))
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_scope_level_to_mespack() {
        assert_eq!(default_directives(Level::DEBUG), "warn,mespack=debug");
        assert!(EnvFilter::try_new(default_directives(Level::INFO)).is_ok());
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
        tracing::info!("still logging");
    }
}
