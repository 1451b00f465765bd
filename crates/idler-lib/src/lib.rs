//! Scale-to-zero controller for a function gateway
//!
//! This crate provides:
//! - Gateway inventory and scale clients
//! - Invocation-rate queries against Prometheus
//! - The idle-detection policy
//! - The reconciliation loop tying them together
//! - Health checks and observability

pub mod api;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod health;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod policy;
pub mod reconciler;

pub use config::Settings;
pub use credentials::Credentials;
pub use error::{ConfigError, MetricsError, RequestError, SampleError};
pub use gateway::{FunctionInventory, GatewayClient, ScaleClient, ScaleExecutor, ScaleResult};
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry};
pub use metrics::{InvocationMetrics, PrometheusClient};
pub use models::*;
pub use observability::{ControllerMetrics, StructuredLogger};
pub use reconciler::{CycleReport, FunctionOutcome, Reconciler, ReconcilerBuilder};
