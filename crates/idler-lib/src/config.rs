//! Controller configuration

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Raw configuration as read from the environment
#[derive(Debug, Clone, Deserialize)]
pub struct RawSettings {
    /// Gateway base URL, e.g. `http://gateway:8080/`
    #[serde(default)]
    pub gateway_url: Option<String>,

    #[serde(default = "default_prometheus_host")]
    pub prometheus_host: String,

    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,

    /// Window over which invocation rate is aggregated (e.g. `5m`)
    #[serde(default = "default_inactivity_duration")]
    pub inactivity_duration: String,

    /// Pause between reconciliation cycles (e.g. `1m`)
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval: String,

    /// Directory holding `basic-auth-user` and `basic-auth-password`
    #[serde(default = "default_secret_mount_path")]
    pub secret_mount_path: PathBuf,

    #[serde(default = "default_http_timeout")]
    pub http_timeout: String,

    /// Port for the health/metrics server
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub write_debug: Option<String>,
}

/// Variables read by the controller. Anything else in the environment,
/// such as Kubernetes service links (`PROMETHEUS_PORT=tcp://...`), is ignored.
pub const ENV_KEYS: &[&str] = &[
    "gateway_url",
    "prometheus_host",
    "prometheus_port",
    "inactivity_duration",
    "reconcile_interval",
    "secret_mount_path",
    "http_timeout",
    "api_port",
    "write_debug",
];

/// Shortest window a range selector can express in whole minutes
const MIN_INACTIVITY: Duration = Duration::from_secs(60);

fn default_prometheus_host() -> String {
    "prometheus".to_string()
}

fn default_prometheus_port() -> u16 {
    9090
}

fn default_inactivity_duration() -> String {
    "5m".to_string()
}

fn default_reconcile_interval() -> String {
    "1m".to_string()
}

fn default_secret_mount_path() -> PathBuf {
    PathBuf::from("/var/secrets")
}

fn default_http_timeout() -> String {
    "30s".to_string()
}

fn default_api_port() -> u16 {
    8081
}

/// Validated, immutable controller settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub gateway_url: Url,
    pub prometheus_host: String,
    pub prometheus_port: u16,
    pub inactivity_duration: Duration,
    pub reconcile_interval: Duration,
    pub secret_mount_path: PathBuf,
    pub http_timeout: Duration,
    pub api_port: u16,
    pub write_debug: bool,
    pub dry_run: bool,
}

impl Settings {
    /// Load configuration from the process environment.
    ///
    /// Only the exact names in [`ENV_KEYS`] are read.
    pub fn load(dry_run: bool) -> Result<Self, ConfigError> {
        let vars = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
        Self::load_from(vars, dry_run)
    }

    /// Load configuration from an explicit set of variables
    pub fn load_from<I>(vars: I, dry_run: bool) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let known: config::Map<String, String> = vars
            .into_iter()
            .filter(|(key, _)| ENV_KEYS.contains(&key.as_str()))
            .collect();

        let raw: RawSettings = config::Config::builder()
            .add_source(config::Environment::default().source(Some(known)))
            .build()?
            .try_deserialize()?;

        Self::from_raw(raw, dry_run)
    }

    pub fn from_raw(raw: RawSettings, dry_run: bool) -> Result<Self, ConfigError> {
        let gateway_url = match raw.gateway_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => parse_gateway_url(url)?,
            _ => return Err(ConfigError::MissingGatewayUrl),
        };

        let inactivity_duration = parse_duration("inactivity_duration", &raw.inactivity_duration)?;
        if inactivity_duration < MIN_INACTIVITY {
            return Err(ConfigError::InvalidDuration {
                key: "inactivity_duration",
                value: raw.inactivity_duration,
            });
        }

        Ok(Self {
            gateway_url,
            prometheus_host: raw.prometheus_host,
            prometheus_port: raw.prometheus_port,
            inactivity_duration,
            reconcile_interval: parse_duration("reconcile_interval", &raw.reconcile_interval)?,
            secret_mount_path: raw.secret_mount_path,
            http_timeout: parse_duration("http_timeout", &raw.http_timeout)?,
            api_port: raw.api_port,
            write_debug: is_truthy(raw.write_debug.as_deref()),
            dry_run,
        })
    }

    /// Inactivity window rendered for a range selector, in whole minutes.
    /// Never below `1m`.
    pub fn inactivity_window(&self) -> String {
        format!("{}m", self.inactivity_duration.as_secs() / 60)
    }
}

/// `"1"` and `"true"` switch a flag on; anything else leaves it off
pub fn is_truthy(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("true"))
}

fn parse_gateway_url(raw: &str) -> Result<Url, ConfigError> {
    // Paths are joined relative to the gateway root, which needs a trailing slash
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };

    Url::parse(&normalized).map_err(|source| ConfigError::InvalidGatewayUrl {
        url: raw.to_string(),
        source,
    })
}

/// Parse `30s`, `5m`, `1h` or a bare number of seconds
pub fn parse_duration(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration {
        key,
        value: value.to_string(),
    };

    let trimmed = value.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let amount: u64 = number.parse().map_err(|_| invalid())?;
    let seconds = match unit {
        "" | "s" => amount,
        "m" => amount.checked_mul(60).ok_or_else(invalid)?,
        "h" => amount.checked_mul(3600).ok_or_else(invalid)?,
        _ => return Err(invalid()),
    };

    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(gateway_url: Option<&str>) -> RawSettings {
        RawSettings {
            gateway_url: gateway_url.map(str::to_string),
            prometheus_host: default_prometheus_host(),
            prometheus_port: default_prometheus_port(),
            inactivity_duration: default_inactivity_duration(),
            reconcile_interval: default_reconcile_interval(),
            secret_mount_path: default_secret_mount_path(),
            http_timeout: default_http_timeout(),
            api_port: default_api_port(),
            write_debug: None,
        }
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("k", "30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("k", "5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("k", "2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("k", "45").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("k", "").is_err());
        assert!(parse_duration("k", "m").is_err());
        assert!(parse_duration("k", "5d").is_err());
        assert!(parse_duration("k", "1m30s").is_err());
    }

    #[test]
    fn test_parse_duration_overflow_is_an_error() {
        assert!(matches!(
            parse_duration("k", "999999999999999999m"),
            Err(ConfigError::InvalidDuration { key: "k", .. })
        ));
        assert!(parse_duration("k", "999999999999999999h").is_err());
    }

    #[test]
    fn test_inactivity_under_a_minute_is_rejected() {
        let mut short = raw(Some("http://gateway:8080"));
        short.inactivity_duration = "30s".to_string();

        assert!(matches!(
            Settings::from_raw(short, false),
            Err(ConfigError::InvalidDuration { key: "inactivity_duration", .. })
        ));

        let mut minute = raw(Some("http://gateway:8080"));
        minute.inactivity_duration = "60".to_string();
        let settings = Settings::from_raw(minute, false).unwrap();
        assert_eq!(settings.inactivity_window(), "1m");
    }

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_load_ignores_kubernetes_service_links() {
        let settings = Settings::load_from(
            vars(&[
                ("gateway_url", "http://gateway:8080"),
                ("PROMETHEUS_PORT", "tcp://10.96.0.12:9090"),
                ("PROMETHEUS_SERVICE_HOST", "10.96.0.12"),
                ("GATEWAY_PORT", "tcp://10.96.0.20:8080"),
            ]),
            false,
        )
        .unwrap();

        assert_eq!(settings.prometheus_port, 9090);
        assert_eq!(settings.prometheus_host, "prometheus");
        assert_eq!(settings.gateway_url.as_str(), "http://gateway:8080/");
    }

    #[test]
    fn test_load_reads_known_keys() {
        let settings = Settings::load_from(
            vars(&[
                ("gateway_url", "http://gateway.openfaas:8080/"),
                ("prometheus_port", "9191"),
                ("inactivity_duration", "10m"),
                ("write_debug", "true"),
            ]),
            true,
        )
        .unwrap();

        assert_eq!(settings.prometheus_port, 9191);
        assert_eq!(settings.inactivity_window(), "10m");
        assert!(settings.write_debug);
        assert!(settings.dry_run);
    }

    #[test]
    fn test_load_without_gateway_url_fails() {
        assert!(matches!(
            Settings::load_from(vars(&[("PROMETHEUS_PORT", "tcp://10.96.0.12:9090")]), false),
            Err(ConfigError::MissingGatewayUrl)
        ));
    }

    #[test]
    fn test_missing_gateway_url_is_an_error() {
        assert!(matches!(
            Settings::from_raw(raw(None), false),
            Err(ConfigError::MissingGatewayUrl)
        ));
        assert!(matches!(
            Settings::from_raw(raw(Some("  ")), false),
            Err(ConfigError::MissingGatewayUrl)
        ));
    }

    #[test]
    fn test_gateway_url_gets_trailing_slash() {
        let settings = Settings::from_raw(raw(Some("http://gateway:8080")), false).unwrap();
        assert_eq!(settings.gateway_url.as_str(), "http://gateway:8080/");

        let joined = settings.gateway_url.join("system/functions").unwrap();
        assert_eq!(joined.as_str(), "http://gateway:8080/system/functions");
    }

    #[test]
    fn test_invalid_gateway_url() {
        assert!(matches!(
            Settings::from_raw(raw(Some("not a url")), false),
            Err(ConfigError::InvalidGatewayUrl { .. })
        ));
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_raw(raw(Some("http://gateway:8080/")), true).unwrap();
        assert!(settings.dry_run);
        assert!(!settings.write_debug);
        assert_eq!(settings.prometheus_port, 9090);
        assert_eq!(settings.inactivity_duration, Duration::from_secs(300));
        assert_eq!(settings.reconcile_interval, Duration::from_secs(60));
        assert_eq!(settings.inactivity_window(), "5m");
    }

    #[test]
    fn test_write_debug_values() {
        assert!(is_truthy(Some("1")));
        assert!(is_truthy(Some("true")));
        assert!(!is_truthy(Some("TRUE")));
        assert!(!is_truthy(Some("yes")));
        assert!(!is_truthy(None));
    }
}
