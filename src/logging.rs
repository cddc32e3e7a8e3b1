//! Opt-in tracing setup for binaries and tests that use this crate.
//!
//! The library itself only emits `tracing` events; nothing is printed unless
//! the application installs a subscriber, either its own or this one.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Noisy dependencies kept at `warn` unless `RUST_LOG` says otherwise.
const QUIET_TARGETS: &[&str] = &["hyper", "reqwest", "rustls", "h2"];

/// Build the filter: `RUST_LOG` if set and valid, else `default_directive`
/// plus the quiet-target overrides.
pub fn build_env_filter(default_directive: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut directives = vec![default_directive.to_string()];
    directives.extend(QUIET_TARGETS.iter().map(|target| format!("{}=warn", target)));
    let joined = directives.join(",");
    EnvFilter::try_new(&joined).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a compact stderr subscriber.
///
/// Returns `false` if a global subscriber was already installed, which makes
/// repeated calls (e.g. from several tests) harmless.
pub fn init_logging(default_directive: &str) -> bool {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(build_env_filter(default_directive))
        .with(fmt_layer)
        .try_init()
        .is_ok()
}
