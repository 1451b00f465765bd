//! Reconciliation loop
//!
//! One cycle fetches the function inventory, queries the invocation rate of
//! every function, and scales opted-in idle functions to zero. Cycles run
//! back to back with a fixed pause in between and never overlap.

use crate::gateway::{FunctionInventory, ScaleExecutor, ScaleResult};
use crate::health::{components, HealthRegistry};
use crate::metrics::InvocationMetrics;
use crate::models::{FunctionDescriptor, MetricOutcome, MetricSample, RateSeries};
use crate::observability::{ControllerMetrics, StructuredLogger};
use crate::policy;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Loop configuration
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Pause between cycles
    pub interval: Duration,
    /// Range selector for the rate query, e.g. `5m`
    pub inactivity_window: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            inactivity_window: "5m".to_string(),
        }
    }
}

/// Where a function ended up in one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FunctionOutcome {
    /// Not opted in
    Excluded,
    /// No metric series and a nonzero invocation history
    UnknownActive,
    /// Nonzero invocation rate
    Active { rate: f64 },
    /// Idle with replicas running; a scale-to-zero was issued
    IdleScaled(ScaleResult),
    /// Idle and already at zero available replicas
    IdleAlreadyZero,
    /// The invocation-rate query failed
    QueryFailed,
    /// The live replica lookup failed
    ReplicaLookupFailed,
}

/// Summary of one cycle
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Inventory could not be fetched; nothing else happened
    pub aborted: bool,
    pub outcomes: Vec<(String, FunctionOutcome)>,
}

impl CycleReport {
    fn aborted() -> Self {
        Self {
            aborted: true,
            outcomes: Vec::new(),
        }
    }

    pub fn outcome(&self, name: &str) -> Option<FunctionOutcome> {
        self.outcomes
            .iter()
            .find(|(function, _)| function == name)
            .map(|(_, outcome)| *outcome)
    }

    pub fn idle_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, FunctionOutcome::IdleScaled(_) | FunctionOutcome::IdleAlreadyZero))
            .count()
    }

    pub fn scaled_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, FunctionOutcome::IdleScaled(_)))
            .count()
    }
}

/// Sum the series belonging to `function` into one sample.
///
/// With no series at all, a function that has never been invoked counts as
/// idle while one with invocation history is unknown: the metrics backend
/// may simply have a gap.
pub fn aggregate(function: &FunctionDescriptor, series: &[RateSeries]) -> MetricSample {
    if series.is_empty() {
        let outcome = if function.invocation_count == 0 {
            MetricOutcome::Observed(0.0)
        } else {
            MetricOutcome::Unknown
        };
        return MetricSample {
            function_name: function.name.clone(),
            outcome,
        };
    }

    let mut total = 0.0;
    let mut parsed = 0usize;
    let mut rejected = 0usize;

    for s in series {
        debug!(
            function = %function.name,
            series_function = %s.function_name,
            code = ?s.code,
            value = ?s.value,
            "Metric series"
        );

        if s.function_name != function.name {
            continue;
        }

        match &s.value {
            Ok(value) => {
                total += value;
                parsed += 1;
            }
            Err(e) => {
                rejected += 1;
                warn!(function = %function.name, error = %e, "Unable to convert value for metric");
            }
        }
    }

    // Every matching series was unreadable
    let outcome = if parsed == 0 && rejected > 0 {
        MetricOutcome::Unknown
    } else {
        MetricOutcome::Observed(total)
    };

    MetricSample {
        function_name: function.name.clone(),
        outcome,
    }
}

/// Drives inventory -> metrics -> policy -> scale
pub struct Reconciler {
    inventory: Arc<dyn FunctionInventory>,
    metrics_source: Arc<dyn InvocationMetrics>,
    scaler: Arc<dyn ScaleExecutor>,
    config: ReconcileConfig,
    health: Option<HealthRegistry>,
    metrics: ControllerMetrics,
    logger: StructuredLogger,
}

impl Reconciler {
    pub fn new(
        inventory: Arc<dyn FunctionInventory>,
        metrics_source: Arc<dyn InvocationMetrics>,
        scaler: Arc<dyn ScaleExecutor>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            inventory,
            metrics_source,
            scaler,
            config,
            health: None,
            metrics: ControllerMetrics::new(),
            logger: StructuredLogger::new("gateway"),
        }
    }

    /// Run cycles forever. There is no shutdown path; the process is killed.
    pub async fn run_forever(&self) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            inactivity_duration = %self.config.inactivity_window,
            "Starting reconciliation loop"
        );

        loop {
            self.reconcile().await;
            tokio::time::sleep(self.config.interval).await;
        }
    }

    /// Perform exactly one cycle
    pub async fn reconcile(&self) -> CycleReport {
        let start = Instant::now();
        self.metrics.inc_cycles();

        let functions = match self.inventory.list_functions().await {
            Ok(functions) => functions,
            Err(e) => {
                warn!(error = %e, "Unable to list functions, skipping cycle");
                self.metrics.inc_gateway_errors();
                self.metrics.inc_aborted_cycles();
                self.mark_degraded(components::GATEWAY, e.to_string()).await;
                return CycleReport::aborted();
            }
        };
        self.mark_healthy(components::GATEWAY).await;
        self.metrics.set_functions_observed(functions.len() as i64);

        let samples = self.build_metrics_map(&functions).await;

        let mut report = CycleReport::default();
        for function in &functions {
            let outcome = self.evaluate(function, samples.get(&function.name)).await;
            report.outcomes.push((function.name.clone(), outcome));
        }

        let elapsed = start.elapsed();
        self.metrics.observe_cycle_duration(elapsed.as_secs_f64());
        self.metrics.set_functions_idle(report.idle_count() as i64);
        self.mark_healthy(components::RECONCILER).await;
        self.logger.log_cycle(
            functions.len(),
            report.idle_count(),
            report.scaled_count(),
            elapsed.as_millis(),
        );

        report
    }

    /// Query every function in turn. A failed query leaves that function out
    /// of the map; the others are unaffected.
    async fn build_metrics_map(
        &self,
        functions: &[FunctionDescriptor],
    ) -> HashMap<String, MetricOutcome> {
        let mut samples = HashMap::with_capacity(functions.len());
        let mut failures = 0usize;

        for function in functions {
            match self
                .metrics_source
                .query_invocation_rate(&function.name, &self.config.inactivity_window)
                .await
            {
                Ok(series) => {
                    let sample = aggregate(function, &series);
                    samples.insert(sample.function_name, sample.outcome);
                }
                Err(e) => {
                    failures += 1;
                    self.metrics.inc_metric_query_errors();
                    warn!(function = %function.name, error = %e, "Metrics query failed");
                }
            }
        }

        if failures == 0 {
            self.mark_healthy(components::METRICS_BACKEND).await;
        } else {
            self.mark_degraded(
                components::METRICS_BACKEND,
                format!("{failures} metric queries failed"),
            )
            .await;
        }

        samples
    }

    async fn evaluate(
        &self,
        function: &FunctionDescriptor,
        sample: Option<&MetricOutcome>,
    ) -> FunctionOutcome {
        if !policy::is_scale_candidate(function.labels.as_ref()) {
            debug!(function = %function.name, "Skip: missing scale-to-zero label");
            return FunctionOutcome::Excluded;
        }

        let rate = match sample {
            None => return FunctionOutcome::QueryFailed,
            Some(MetricOutcome::Unknown) => {
                debug!(function = %function.name, "No metric data, treating as active");
                return FunctionOutcome::UnknownActive;
            }
            Some(MetricOutcome::Observed(rate)) => *rate,
        };

        if !policy::is_idle(rate) {
            debug!(function = %function.name, rate = rate, "Active");
            return FunctionOutcome::Active { rate };
        }

        self.logger.log_idle(&function.name);

        // Re-check live replicas so an already scaled-down function gets no command
        match self.inventory.get_replicas(&function.name).await {
            Ok(live) if live.available_replicas() > 0 => {
                let result = self.scaler.send_scale_event(&function.name, 0).await;
                self.metrics.inc_scale_commands(result.label());
                FunctionOutcome::IdleScaled(result)
            }
            Ok(_) => {
                debug!(function = %function.name, "Already at zero replicas");
                FunctionOutcome::IdleAlreadyZero
            }
            Err(e) => {
                self.metrics.inc_gateway_errors();
                warn!(function = %function.name, error = %e, "Unable to read replicas");
                FunctionOutcome::ReplicaLookupFailed
            }
        }
    }

    async fn mark_healthy(&self, component: &str) {
        if let Some(health) = &self.health {
            health.set_healthy(component).await;
        }
    }

    async fn mark_degraded(&self, component: &str, message: String) {
        if let Some(health) = &self.health {
            health.set_degraded(component, message).await;
        }
    }
}

/// Builder for the reconciler
pub struct ReconcilerBuilder {
    inventory: Option<Arc<dyn FunctionInventory>>,
    metrics_source: Option<Arc<dyn InvocationMetrics>>,
    scaler: Option<Arc<dyn ScaleExecutor>>,
    config: ReconcileConfig,
    health: Option<HealthRegistry>,
    gateway_label: Option<String>,
}

impl ReconcilerBuilder {
    pub fn new() -> Self {
        Self {
            inventory: None,
            metrics_source: None,
            scaler: None,
            config: ReconcileConfig::default(),
            health: None,
            gateway_label: None,
        }
    }

    pub fn inventory(mut self, inventory: Arc<dyn FunctionInventory>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    pub fn metrics_source(mut self, metrics_source: Arc<dyn InvocationMetrics>) -> Self {
        self.metrics_source = Some(metrics_source);
        self
    }

    pub fn scaler(mut self, scaler: Arc<dyn ScaleExecutor>) -> Self {
        self.scaler = Some(scaler);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn inactivity_window(mut self, window: impl Into<String>) -> Self {
        self.config.inactivity_window = window.into();
        self
    }

    /// Report component health into `registry`
    pub fn health(mut self, registry: HealthRegistry) -> Self {
        self.health = Some(registry);
        self
    }

    /// Gateway URL attached to structured log events
    pub fn gateway_label(mut self, label: impl Into<String>) -> Self {
        self.gateway_label = Some(label.into());
        self
    }

    pub fn build(self) -> Result<Reconciler> {
        let inventory = self
            .inventory
            .ok_or_else(|| anyhow::anyhow!("Inventory client is required"))?;
        let metrics_source = self
            .metrics_source
            .ok_or_else(|| anyhow::anyhow!("Metrics client is required"))?;
        let scaler = self
            .scaler
            .ok_or_else(|| anyhow::anyhow!("Scale client is required"))?;

        let mut reconciler = Reconciler::new(inventory, metrics_source, scaler, self.config);
        reconciler.health = self.health;
        if let Some(label) = self.gateway_label {
            reconciler.logger = StructuredLogger::new(label);
        }

        Ok(reconciler)
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
