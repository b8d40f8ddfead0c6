//! Process-wide log subscriber for the connector binaries.
//!
//! Events are written to stderr, leaving stdout to command output such as
//! `status` and `certs` reports.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when `RUST_LOG` is unset or fails to parse.
fn filter_or(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Install the global subscriber.
///
/// `fallback_filter` applies when `RUST_LOG` does not yield a usable filter.
/// With `json` set every event is one JSON object per line. Calling this
/// twice in one process is a no-op after the first call.
pub fn init_tracing(fallback_filter: &str, json: bool) {
    let (json_layer, text_layer) = if json {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
            None,
        )
    } else {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            ),
        )
    };

    let _ = tracing_subscriber::registry()
        .with(filter_or(fallback_filter))
        .with(json_layer)
        .with(text_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_filter_is_used_without_rust_log() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert_eq!(filter_or("connector=debug").to_string(), "connector=debug");
    }

    #[test]
    fn repeated_init_does_not_panic() {
        init_tracing("connector=info", false);
        init_tracing("connector=info", true);
    }
}
