//! Error types for telemetry operations.

use prometheus::Error as PrometheusError;
use thiserror::Error;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised while installing logging or maintaining the metrics registry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global tracing subscriber is already installed.
    #[error("failed to install tracing subscriber")]
    SubscriberInstall {
        /// Underlying tracing subscriber error.
        source: tracing_subscriber::util::TryInitError,
    },
    /// A counter could not be constructed.
    #[error("failed to build metrics collector")]
    MetricsCollector {
        /// Series name.
        name: &'static str,
        /// Underlying Prometheus error.
        source: PrometheusError,
    },
    /// A counter could not be added to the registry, usually a duplicate name.
    #[error("failed to register metrics collector")]
    MetricsRegister {
        /// Series name.
        name: &'static str,
        /// Underlying Prometheus error.
        source: PrometheusError,
    },
    /// The text exposition could not be produced.
    #[error("failed to render metrics")]
    MetricsRender {
        /// Underlying Prometheus error.
        source: PrometheusError,
    },
}
