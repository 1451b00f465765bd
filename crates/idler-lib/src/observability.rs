//! Observability infrastructure for the idler
//!
//! Provides:
//! - Prometheus metrics (cycle latency, functions observed, scale commands, errors)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for cycle duration (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ControllerMetricsInner> = OnceLock::new();

struct ControllerMetricsInner {
    reconcile_duration_seconds: Histogram,
    reconcile_cycles: IntCounter,
    reconcile_aborted: IntCounter,
    functions_observed: IntGauge,
    functions_idle: IntGauge,
    scale_commands: IntCounterVec,
    metric_query_errors: IntCounter,
    gateway_errors: IntCounter,
}

impl ControllerMetricsInner {
    fn new() -> Self {
        Self {
            reconcile_duration_seconds: register_histogram!(
                "faas_idler_reconcile_duration_seconds",
                "Time spent in one reconciliation cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register reconcile_duration_seconds"),

            reconcile_cycles: register_int_counter!(
                "faas_idler_reconcile_cycles_total",
                "Total number of reconciliation cycles started"
            )
            .expect("Failed to register reconcile_cycles_total"),

            reconcile_aborted: register_int_counter!(
                "faas_idler_reconcile_aborted_total",
                "Cycles abandoned because the function inventory could not be fetched"
            )
            .expect("Failed to register reconcile_aborted_total"),

            functions_observed: register_int_gauge!(
                "faas_idler_functions_observed",
                "Functions returned by the gateway in the last cycle"
            )
            .expect("Failed to register functions_observed"),

            functions_idle: register_int_gauge!(
                "faas_idler_functions_idle",
                "Opted-in functions found idle in the last cycle"
            )
            .expect("Failed to register functions_idle"),

            scale_commands: register_int_counter_vec!(
                "faas_idler_scale_commands_total",
                "Scale-to-zero commands by result",
                &["result"]
            )
            .expect("Failed to register scale_commands_total"),

            metric_query_errors: register_int_counter!(
                "faas_idler_metric_query_errors_total",
                "Failed invocation-rate queries"
            )
            .expect("Failed to register metric_query_errors_total"),

            gateway_errors: register_int_counter!(
                "faas_idler_gateway_errors_total",
                "Failed requests to the gateway control API"
            )
            .expect("Failed to register gateway_errors_total"),
        }
    }
}

/// Controller metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct ControllerMetrics {
    _private: (),
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ControllerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ControllerMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_cycle_duration(&self, duration_secs: f64) {
        self.inner().reconcile_duration_seconds.observe(duration_secs);
    }

    pub fn inc_cycles(&self) {
        self.inner().reconcile_cycles.inc();
    }

    pub fn inc_aborted_cycles(&self) {
        self.inner().reconcile_aborted.inc();
    }

    pub fn set_functions_observed(&self, count: i64) {
        self.inner().functions_observed.set(count);
    }

    pub fn set_functions_idle(&self, count: i64) {
        self.inner().functions_idle.set(count);
    }

    /// `result` is one of `sent`, `dry_run` or `failed`
    pub fn inc_scale_commands(&self, result: &str) {
        self.inner()
            .scale_commands
            .with_label_values(&[result])
            .inc();
    }

    pub fn inc_metric_query_errors(&self) {
        self.inner().metric_query_errors.inc();
    }

    pub fn inc_gateway_errors(&self) {
        self.inner().gateway_errors.inc();
    }

    /// Text exposition of every registered metric
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Structured logger for controller events
#[derive(Clone)]
pub struct StructuredLogger {
    gateway: String,
}

impl StructuredLogger {
    pub fn new(gateway: impl Into<String>) -> Self {
        Self {
            gateway: gateway.into(),
        }
    }

    pub fn log_startup(
        &self,
        version: &str,
        gateway_release: &str,
        gateway_sha: &str,
        dry_run: bool,
        inactivity_window: &str,
    ) {
        info!(
            event = "idler_started",
            gateway = %self.gateway,
            idler_version = %version,
            gateway_release = %gateway_release,
            gateway_sha = %gateway_sha,
            dry_run = dry_run,
            inactivity_duration = %inactivity_window,
            "Scale-to-zero controller started"
        );
    }

    pub fn log_idle(&self, function: &str) {
        info!(
            event = "function_idle",
            gateway = %self.gateway,
            function = %function,
            "Function idle"
        );
    }

    pub fn log_scale(&self, function: &str, replicas: u64, status: u16) {
        info!(
            event = "scale_sent",
            gateway = %self.gateway,
            function = %function,
            replicas = replicas,
            status = status,
            "Scale"
        );
    }

    pub fn log_dry_run_scale(&self, function: &str, replicas: u64) {
        info!(
            event = "scale_dry_run",
            gateway = %self.gateway,
            function = %function,
            replicas = replicas,
            "dry-run: scaling {} to {} replicas",
            function,
            replicas
        );
    }

    pub fn log_scale_failed(&self, function: &str, replicas: u64, error: &str) {
        warn!(
            event = "scale_failed",
            gateway = %self.gateway,
            function = %function,
            replicas = replicas,
            error = %error,
            "Scale command failed, next cycle will re-evaluate"
        );
    }

    pub fn log_cycle(&self, observed: usize, idle: usize, scaled: usize, elapsed_ms: u128) {
        info!(
            event = "reconcile_complete",
            gateway = %self.gateway,
            functions = observed,
            idle = idle,
            scaled = scaled,
            elapsed_ms = elapsed_ms,
            "Reconciliation cycle complete"
        );
    }
}
