use std::path::PathBuf;
use std::time::Duration;

use crate::findings::DEFAULT_THRESHOLD;
use crate::model::ExecutionPolicy;
use crate::rate_limit::RateLimit;

/// Application-level constants
pub const APP_NAME: &str = "lungscan";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default upload cap: 16 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 16 * 1024 * 1024;

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "lungscan=info"
}

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("invalid value for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub reason: String,
}

/// Everything the service reads from its environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub samples_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub rate_limit: RateLimit,
    pub threshold: f32,
    pub inference_timeout: Option<Duration>,
    pub execution_policy: ExecutionPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            host: "0.0.0.0".into(),
            port: 5000,
            model_path: PathBuf::from("models/densenet121-res224-all.json"),
            samples_dir: PathBuf::from("images"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            rate_limit: RateLimit::default(),
            threshold: DEFAULT_THRESHOLD,
            inference_timeout: None,
            execution_policy: ExecutionPolicy::Serialized,
        }
    }
}

impl ServiceConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any `name -> value` lookup; unset names keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = ServiceConfig::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        if let Some(host) = get("LUNGSCAN_HOST") {
            cfg.host = host;
        }
        if let Some(port) = get("PORT") {
            cfg.port = parse("PORT", &port)?;
        }
        if let Some(path) = get("LUNGSCAN_MODEL_PATH") {
            cfg.model_path = PathBuf::from(path);
        }
        if let Some(dir) = get("LUNGSCAN_SAMPLES_DIR") {
            cfg.samples_dir = PathBuf::from(dir);
        }
        if let Some(bytes) = get("LUNGSCAN_MAX_UPLOAD_BYTES") {
            cfg.max_upload_bytes = parse("LUNGSCAN_MAX_UPLOAD_BYTES", &bytes)?;
        }
        if let Some(rate) = get("LUNGSCAN_RATE_LIMIT") {
            cfg.rate_limit = rate
                .parse()
                .map_err(|reason| ConfigError { var: "LUNGSCAN_RATE_LIMIT", reason })?;
        }
        if let Some(threshold) = get("LUNGSCAN_THRESHOLD") {
            let value: f32 = parse("LUNGSCAN_THRESHOLD", &threshold)?;
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError {
                    var: "LUNGSCAN_THRESHOLD",
                    reason: format!("{value} is outside [0, 1]"),
                });
            }
            cfg.threshold = value;
        }
        if let Some(secs) = get("LUNGSCAN_INFERENCE_TIMEOUT_SECS") {
            let secs: f64 = parse("LUNGSCAN_INFERENCE_TIMEOUT_SECS", &secs)?;
            cfg.inference_timeout = if secs > 0.0 {
                Some(Duration::try_from_secs_f64(secs).map_err(|e| ConfigError {
                    var: "LUNGSCAN_INFERENCE_TIMEOUT_SECS",
                    reason: e.to_string(),
                })?)
            } else {
                None
            };
        }
        if let Some(flag) = get("LUNGSCAN_SERIALIZE_INFERENCE") {
            cfg.execution_policy = if parse_bool("LUNGSCAN_SERIALIZE_INFERENCE", &flag)? {
                ExecutionPolicy::Serialized
            } else {
                ExecutionPolicy::Concurrent
            };
        }
        Ok(cfg)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError { var, reason: format!("cannot parse '{raw}'") })
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError { var, reason: format!("'{raw}' is not a boolean") }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(pairs: &[(&str, &str)]) -> Result<ServiceConfig, ConfigError> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ServiceConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_match_the_service_contract() {
        let cfg = from(&[]).unwrap();
        assert_eq!(cfg.bind_addr(), "0.0.0.0:5000");
        assert_eq!(cfg.max_upload_bytes, 16 * 1024 * 1024);
        assert_eq!(cfg.rate_limit, RateLimit { limit: 10, window: Duration::from_secs(60) });
        assert_eq!(cfg.threshold, 0.5);
        assert_eq!(cfg.execution_policy, ExecutionPolicy::Serialized);
        assert!(cfg.inference_timeout.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = from(&[
            ("PORT", "8080"),
            ("LUNGSCAN_RATE_LIMIT", "3/second"),
            ("LUNGSCAN_THRESHOLD", "0.65"),
            ("LUNGSCAN_INFERENCE_TIMEOUT_SECS", "2.5"),
            ("LUNGSCAN_SERIALIZE_INFERENCE", "false"),
            ("LUNGSCAN_SAMPLES_DIR", "/srv/samples"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.rate_limit.limit, 3);
        assert_eq!(cfg.threshold, 0.65);
        assert_eq!(cfg.inference_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(cfg.execution_policy, ExecutionPolicy::Concurrent);
        assert_eq!(cfg.samples_dir, PathBuf::from("/srv/samples"));
    }

    #[test]
    fn blank_values_keep_defaults() {
        assert_eq!(from(&[("PORT", "  ")]).unwrap().port, 5000);
    }

    #[test]
    fn bad_values_name_the_variable() {
        assert_eq!(from(&[("PORT", "http")]).unwrap_err().var, "PORT");
        assert_eq!(from(&[("LUNGSCAN_THRESHOLD", "1.5")]).unwrap_err().var, "LUNGSCAN_THRESHOLD");
        assert_eq!(from(&[("LUNGSCAN_RATE_LIMIT", "lots")]).unwrap_err().var, "LUNGSCAN_RATE_LIMIT");
        assert_eq!(
            from(&[("LUNGSCAN_SERIALIZE_INFERENCE", "maybe")]).unwrap_err().var,
            "LUNGSCAN_SERIALIZE_INFERENCE"
        );
    }

    #[test]
    fn zero_timeout_disables_it() {
        let cfg = from(&[("LUNGSCAN_INFERENCE_TIMEOUT_SECS", "0")]).unwrap();
        assert!(cfg.inference_timeout.is_none());
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
