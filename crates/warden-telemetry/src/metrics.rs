//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes only the counters the auth pipeline records.

use std::sync::Arc;

use prometheus::core::Collector;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across the auth pipeline.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    bootstrap_outcomes_total: IntCounterVec,
    token_refresh_total: IntCounterVec,
    notifications_published_total: IntCounterVec,
    requests_deferred_total: IntCounter,
    request_replays_total: IntCounter,
    forced_logouts_total: IntCounter,
}

/// Snapshot of the request-path counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Requests held back because the token was expired or about to expire.
    pub requests_deferred_total: u64,
    /// Deferred requests resubmitted after a successful refresh.
    pub request_replays_total: u64,
    /// Logouts forced by a refresh failure or an explicit logout action.
    pub forced_logouts_total: u64,
    /// Successful token refresh calls.
    pub token_refresh_ok_total: u64,
    /// Failed token refresh calls.
    pub token_refresh_failed_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let bootstrap_outcomes_total = IntCounterVec::new(
            Opts::new(
                "bootstrap_outcomes_total",
                "Authentication bootstrap outcomes by kind",
            ),
            &["outcome"],
        )
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "bootstrap_outcomes_total",
            source,
        })?;
        let token_refresh_total = IntCounterVec::new(
            Opts::new("token_refresh_total", "Token refresh attempts by result"),
            &["result"],
        )
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "token_refresh_total",
            source,
        })?;
        let notifications_published_total = IntCounterVec::new(
            Opts::new(
                "notifications_published_total",
                "User-visible notifications by severity",
            ),
            &["severity"],
        )
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "notifications_published_total",
            source,
        })?;
        let requests_deferred_total = counter(
            "requests_deferred_total",
            "Outbound requests deferred pending a token refresh",
        )?;
        let request_replays_total = counter(
            "request_replays_total",
            "Deferred requests replayed after a token refresh",
        )?;
        let forced_logouts_total = counter(
            "forced_logouts_total",
            "Identity provider logouts forced by the session pipeline",
        )?;

        register(
            &registry,
            "bootstrap_outcomes_total",
            bootstrap_outcomes_total.clone(),
        )?;
        register(&registry, "token_refresh_total", token_refresh_total.clone())?;
        register(
            &registry,
            "notifications_published_total",
            notifications_published_total.clone(),
        )?;
        register(
            &registry,
            "requests_deferred_total",
            requests_deferred_total.clone(),
        )?;
        register(
            &registry,
            "request_replays_total",
            request_replays_total.clone(),
        )?;
        register(
            &registry,
            "forced_logouts_total",
            forced_logouts_total.clone(),
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                bootstrap_outcomes_total,
                token_refresh_total,
                notifications_published_total,
                requests_deferred_total,
                request_replays_total,
                forced_logouts_total,
            }),
        })
    }

    /// Record the terminal outcome of an authentication bootstrap.
    pub fn inc_bootstrap_outcome(&self, outcome: &str) {
        self.inner
            .bootstrap_outcomes_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record a token refresh attempt; `ok` is false when the adapter rejected it.
    pub fn inc_token_refresh(&self, ok: bool) {
        let result = if ok { "ok" } else { "failed" };
        self.inner
            .token_refresh_total
            .with_label_values(&[result])
            .inc();
    }

    /// Record a user-visible notification.
    pub fn inc_notification(&self, severity: &str) {
        self.inner
            .notifications_published_total
            .with_label_values(&[severity])
            .inc();
    }

    /// Record a request deferred behind a refresh.
    pub fn inc_request_deferred(&self) {
        self.inner.requests_deferred_total.inc();
    }

    /// Record a deferred request being replayed.
    pub fn inc_request_replay(&self) {
        self.inner.request_replays_total.inc();
    }

    /// Record a forced identity provider logout.
    pub fn inc_forced_logout(&self) {
        self.inner.forced_logouts_total.inc();
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be encoded.
    pub fn render(&self) -> Result<String> {
        TextEncoder::new()
            .encode_to_string(&self.inner.registry.gather())
            .map_err(|source| TelemetryError::MetricsRender { source })
    }

    /// Take a point-in-time snapshot of the request-path counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_deferred_total: self.inner.requests_deferred_total.get(),
            request_replays_total: self.inner.request_replays_total.get(),
            forced_logouts_total: self.inner.forced_logouts_total.get(),
            token_refresh_ok_total: self
                .inner
                .token_refresh_total
                .with_label_values(&["ok"])
                .get(),
            token_refresh_failed_total: self
                .inner
                .token_refresh_total
                .with_label_values(&["failed"])
                .get(),
        }
    }
}

fn counter(name: &'static str, help: &str) -> Result<IntCounter> {
    IntCounter::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn register<C>(registry: &Registry, name: &'static str, collector: C) -> Result<()>
where
    C: Collector + 'static,
{
    registry
        .register(Box::new(collector))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}
