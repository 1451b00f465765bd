//! Idle-detection policy

use std::collections::HashMap;

/// Label a function must carry to be managed by the idler
pub const SCALE_LABEL: &str = "com.openfaas.scale.zero";

/// Functions are opt-in: the label must be exactly `"1"` or `"true"`.
pub fn is_scale_candidate(labels: Option<&HashMap<String, String>>) -> bool {
    labels
        .and_then(|labels| labels.get(SCALE_LABEL))
        .map(|value| value == "1" || value == "true")
        .unwrap_or(false)
}

/// Exact comparison, no tolerance. Near-zero noise counts as activity.
pub fn is_idle(rate: f64) -> bool {
    rate == 0.0
}
