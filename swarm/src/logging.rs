//! Development-time tracing for hosts embedding the swarm.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! host's call.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a compact stderr subscriber filtered by `RUST_LOG` (default `warn`).
///
/// Panics if a global subscriber is already set; see [`try_init`].
pub fn init() {
    subscriber().init();
}

/// Like [`init`], but returns false instead of panicking when a subscriber
/// is already installed.
pub fn try_init() -> bool {
    subscriber().try_init().is_ok()
}

fn subscriber() -> impl SubscriberInitExt {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
}
