//! Core data models for the idler

use crate::error::SampleError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// A deployed function as reported by the gateway
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDescriptor {
    pub name: String,
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
    /// Invocation total as last seen by the gateway. May be stale.
    #[serde(default, deserialize_with = "count_from_number")]
    pub invocation_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_replicas: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl FunctionDescriptor {
    pub fn available_replicas(&self) -> u64 {
        self.available_replicas.unwrap_or(0)
    }
}

// Some providers report the invocation total as a float.
fn count_from_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.map(|v| if v > 0.0 { v as u64 } else { 0 }).unwrap_or(0))
}

/// Body of `POST system/scale-function/{name}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleCommand {
    pub service_name: String,
    pub replicas: u64,
}

impl ScaleCommand {
    pub fn new(service_name: impl Into<String>, replicas: u64) -> Self {
        Self {
            service_name: service_name.into(),
            replicas,
        }
    }
}

/// Response of `GET system/info`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayInfo {
    #[serde(default)]
    pub version: GatewayVersion,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayVersion {
    #[serde(default)]
    pub release: String,
    #[serde(default)]
    pub sha: String,
}

/// One result series returned by an invocation-rate query
#[derive(Debug, Clone, PartialEq)]
pub struct RateSeries {
    pub function_name: String,
    pub code: Option<String>,
    pub value: Result<f64, SampleError>,
}

/// What the metrics backend told us about one function this cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricOutcome {
    /// Aggregated invocation rate over the inactivity window
    Observed(f64),
    /// No usable data; the function is treated as active
    Unknown,
}

/// Aggregated rate for one function
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub function_name: String,
    pub outcome: MetricOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_deserializes_gateway_shape() {
        let json = r#"{
            "name": "figlet",
            "image": "functions/figlet:latest",
            "invocationCount": 1337,
            "replicas": 1,
            "availableReplicas": 1,
            "labels": {"com.openfaas.scale.zero": "true"}
        }"#;

        let f: FunctionDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(f.name, "figlet");
        assert_eq!(f.invocation_count, 1337);
        assert_eq!(f.available_replicas, Some(1));
        assert_eq!(
            f.labels.unwrap().get("com.openfaas.scale.zero").map(String::as_str),
            Some("true")
        );
    }

    #[test]
    fn test_descriptor_tolerates_missing_fields() {
        let f: FunctionDescriptor = serde_json::from_str(r#"{"name": "bare"}"#).unwrap();
        assert!(f.labels.is_none());
        assert_eq!(f.invocation_count, 0);
        assert_eq!(f.available_replicas(), 0);
    }

    #[test]
    fn test_descriptor_accepts_float_invocation_count() {
        let f: FunctionDescriptor =
            serde_json::from_str(r#"{"name": "f", "invocationCount": 42.0}"#).unwrap();
        assert_eq!(f.invocation_count, 42);
    }

    #[test]
    fn test_scale_command_wire_format() {
        let body = serde_json::to_value(ScaleCommand::new("f1", 0)).unwrap();
        assert_eq!(body, serde_json::json!({"serviceName": "f1", "replicas": 0}));
    }

    #[test]
    fn test_gateway_info_deserializes() {
        let info: GatewayInfo =
            serde_json::from_str(r#"{"provider": {}, "version": {"release": "0.9.0", "sha": "abc"}}"#)
                .unwrap();
        assert_eq!(info.version.release, "0.9.0");
        assert_eq!(info.version.sha, "abc");
    }
}
