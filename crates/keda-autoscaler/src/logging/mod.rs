//! Logging of the adapter process and reporting of reconciliation results.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod k8s_events;

pub use controller::{ReconcilerError, report_controller_reconciled};
pub use k8s_events::{error_chain, publish_controller_error_as_k8s_event};

/// Environment variable holding the log filter, unless the embedding binary picks another one.
pub const DEFAULT_LOG_ENV: &str = "KEDA_AUTOSCALER_LOG";

/// Installs a `tracing` subscriber printing to stdout, filtered by the environment variable `env`.
///
/// The variable uses the [`EnvFilter`] directive syntax, e.g. `keda_autoscaler=debug,kube=info`.
/// Everything at INFO and above is logged if it is unset or holds no valid directive.
pub fn initialize_logging(env: &str) {
    let directives = std::env::var(env).ok();
    let filter = log_filter(directives.as_deref());

    if let Err(error) = Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize logging: {error}");
        return;
    }

    tracing::debug!(env, "Logging initialized");
}

/// Parses `directives`, skipping invalid ones.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse_lossy(directives.unwrap_or_default())
}
