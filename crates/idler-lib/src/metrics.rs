//! Invocation-rate queries against the Prometheus HTTP API

use crate::error::{MetricsError, SampleError};
use crate::models::RateSeries;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;
use url::Url;

/// Counter the gateway increments on every invocation
pub const INVOCATION_METRIC: &str = "gateway_function_invocation_total";

/// Source of per-function invocation rates
#[async_trait]
pub trait InvocationMetrics: Send + Sync {
    /// Rate of invocations of `function_name` over `window` (e.g. `5m`), one
    /// series per response code.
    async fn query_invocation_rate(
        &self,
        function_name: &str,
        window: &str,
    ) -> Result<Vec<RateSeries>, MetricsError>;
}

/// Build the rate-over-window query for one function across all codes
pub fn invocation_rate_query(function_name: &str, window: &str) -> String {
    let escaped = function_name.replace('\\', "\\\\").replace('"', "\\\"");
    format!(
        r#"sum(rate({INVOCATION_METRIC}{{function_name="{escaped}", code=~".*"}}[{window}])) by (code, function_name)"#
    )
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<QueryResult>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    metric: HashMap<String, String>,
    /// `[timestamp, "value"]`
    #[serde(default)]
    value: Vec<serde_json::Value>,
}

impl QueryResult {
    fn into_series(mut self) -> RateSeries {
        let value = parse_sample(&self.value);
        RateSeries {
            function_name: self.metric.remove("function_name").unwrap_or_default(),
            code: self.metric.remove("code"),
            value,
        }
    }
}

/// Sample values arrive as decimal text in the second slot of the pair
pub fn parse_sample(value: &[serde_json::Value]) -> Result<f64, SampleError> {
    match value.get(1) {
        Some(serde_json::Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| SampleError::NotANumber(text.clone())),
        Some(other) => Err(SampleError::UnexpectedType(other.to_string())),
        None => Err(SampleError::Missing),
    }
}

/// Client for `GET /api/v1/query`
pub struct PrometheusClient {
    client: Client,
    query_url: Url,
}

impl PrometheusClient {
    pub fn new(client: Client, host: &str, port: u16) -> Result<Self, MetricsError> {
        let query_url = Url::parse(&format!("http://{host}:{port}/api/v1/query"))?;
        Ok(Self { client, query_url })
    }

    pub fn query_url(&self) -> &Url {
        &self.query_url
    }

    /// Execute a raw instant query
    pub async fn fetch(&self, query: &str) -> Result<Vec<RateSeries>, MetricsError> {
        let response = self
            .client
            .get(self.query_url.clone())
            .query(&[("query", query)])
            .send()
            .await
            .map_err(|source| MetricsError::Transport {
                url: self.query_url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MetricsError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| MetricsError::Transport {
                url: self.query_url.to_string(),
                source,
            })?;

        let parsed: QueryResponse = serde_json::from_slice(&body).map_err(MetricsError::Decode)?;
        if parsed.status != "success" {
            return Err(MetricsError::Query {
                status: parsed.status,
                message: parsed.error.unwrap_or_default(),
            });
        }

        let series: Vec<RateSeries> = parsed
            .data
            .map(|data| data.result)
            .unwrap_or_default()
            .into_iter()
            .map(QueryResult::into_series)
            .collect();

        debug!(query = %query, series = series.len(), "Metrics query complete");
        Ok(series)
    }
}

#[async_trait]
impl InvocationMetrics for PrometheusClient {
    async fn query_invocation_rate(
        &self,
        function_name: &str,
        window: &str,
    ) -> Result<Vec<RateSeries>, MetricsError> {
        self.fetch(&invocation_rate_query(function_name, window)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client_for(server: &Server) -> PrometheusClient {
        let addr = server.host_with_port();
        let (host, port) = addr.rsplit_once(':').unwrap();
        PrometheusClient::new(Client::new(), host, port.parse().unwrap()).unwrap()
    }

    #[test]
    fn test_invocation_rate_query_text() {
        assert_eq!(
            invocation_rate_query("figlet", "5m"),
            r#"sum(rate(gateway_function_invocation_total{function_name="figlet", code=~".*"}[5m])) by (code, function_name)"#
        );
    }

    #[test]
    fn test_invocation_rate_query_escapes_quotes() {
        let query = invocation_rate_query(r#"bad"name"#, "1m");
        assert!(query.contains(r#"function_name="bad\"name""#));
    }

    #[test]
    fn test_parse_sample() {
        assert_eq!(parse_sample(&[json!(1700000000.1), json!("0.25")]), Ok(0.25));
        assert_eq!(parse_sample(&[json!(1700000000.1), json!("0")]), Ok(0.0));
        assert_eq!(
            parse_sample(&[json!(1700000000.1), json!("abc")]),
            Err(SampleError::NotANumber("abc".to_string()))
        );
        assert!(matches!(
            parse_sample(&[json!(1700000000.1), json!(3)]),
            Err(SampleError::UnexpectedType(_))
        ));
        assert_eq!(parse_sample(&[json!(1700000000.1)]), Err(SampleError::Missing));
    }

    #[tokio::test]
    async fn test_query_returns_series_per_code() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::UrlEncoded(
                "query".into(),
                invocation_rate_query("f1", "5m"),
            ))
            .with_status(200)
            .with_body(
                json!({
                    "status": "success",
                    "data": {
                        "resultType": "vector",
                        "result": [
                            {"metric": {"code": "200", "function_name": "f1"}, "value": [1700000000.0, "0.5"]},
                            {"metric": {"code": "500", "function_name": "f1"}, "value": [1700000000.0, "bogus"]}
                        ]
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let series = client_for(&server)
            .query_invocation_rate("f1", "5m")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].function_name, "f1");
        assert_eq!(series[0].code.as_deref(), Some("200"));
        assert_eq!(series[0].value, Ok(0.5));
        assert!(series[1].value.is_err());
    }

    #[tokio::test]
    async fn test_query_with_no_series() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#)
            .create_async()
            .await;

        let series = client_for(&server)
            .query_invocation_rate("f1", "5m")
            .await
            .unwrap();
        assert!(series.is_empty());
    }

    #[tokio::test]
    async fn test_query_error_status() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let err = client_for(&server)
            .query_invocation_rate("f1", "5m")
            .await
            .unwrap_err();
        assert!(matches!(err, MetricsError::Status { status: 503 }));
    }

    #[tokio::test]
    async fn test_query_reported_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"status":"error","errorType":"bad_data","error":"parse error"}"#)
            .create_async()
            .await;

        let err = client_for(&server).fetch("sum(").await.unwrap_err();
        assert!(matches!(err, MetricsError::Query { .. }));
    }

    #[tokio::test]
    async fn test_query_malformed_body() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = client_for(&server).fetch("up").await.unwrap_err();
        assert!(matches!(err, MetricsError::Decode(_)));
    }
}
