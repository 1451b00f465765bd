//! Error types shared by the gateway and metrics clients

use thiserror::Error;

/// Failure talking to the gateway control API
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid gateway url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("malformed response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure executing a query against the metrics backend
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("invalid metrics backend url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("metrics query to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status} from metrics backend")]
    Status { status: u16 },

    #[error("malformed metrics response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("metrics backend reported {status}: {message}")]
    Query { status: String, message: String },
}

/// A single result series whose value could not be turned into a rate
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    #[error("sample value {0:?} is not a decimal number")]
    NotANumber(String),

    #[error("sample value is not a string: {0}")]
    UnexpectedType(String),

    #[error("sample has no value component")]
    Missing,
}

/// Configuration problems detected at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Source(#[from] config::ConfigError),

    #[error("gateway_url is required")]
    MissingGatewayUrl,

    #[error("gateway_url {url:?} is invalid: {source}")]
    InvalidGatewayUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid duration {value:?} for {key}")]
    InvalidDuration { key: &'static str, value: String },
}
