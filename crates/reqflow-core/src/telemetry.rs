//! Log output for the `reqflow` CLI and embedding services.
//!
//! Reports are printed on stdout, so every log line goes to stderr. The
//! request span and `emit_*` events from [`crate::obs`] come out as either
//! compact text or one JSON object per line.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the process-wide subscriber.
///
/// `RUST_LOG` wins over `level` when set. A subscriber installed earlier
/// (by a host process or a test harness) is left in place.
pub fn init_tracing(json: bool, level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let (text, json) = if json {
        let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
        (None, Some(stderr_layer.json()))
    } else {
        let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
        (Some(stderr_layer), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .try_init()
        .ok();
}
