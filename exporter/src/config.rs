//! Top-level configuration for the exporter.
//!
//! This module aggregates configuration for:
//!
//! - the JSON-RPC client (node URL + optional request timeout),
//! - the metrics exporter (listen address),
//! - the poll loop (interval + failure policy).
//!
//! Everything is read once at process start from environment variables
//! via [`ExporterConfig::from_env`]; there is no hot reload.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::poll::FailurePolicy;

pub const ENV_RPC_ADDRESS: &str = "RPC_ADDRESS";
pub const ENV_EXPORTER_PORT: &str = "EXPORTER_PORT";
pub const ENV_RUN_INTERVAL: &str = "RUN_INTERVAL";
pub const ENV_RPC_TIMEOUT: &str = "RPC_TIMEOUT";
pub const ENV_ON_RPC_FAILURE: &str = "ON_RPC_FAILURE";

const DEFAULT_RPC_ADDRESS: &str = "http://localhost:8545";
const DEFAULT_EXPORTER_PORT: u16 = 8000;
const DEFAULT_RUN_INTERVAL_SECS: u64 = 10;

/// Error returned when an environment variable holds an unusable value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid value {:?} for {}: {}",
            self.value, self.var, self.reason
        )
    }
}

impl std::error::Error for ConfigError {}

/// Configuration for the JSON-RPC client.
#[derive(Clone, Debug)]
pub struct RpcClientConfig {
    /// JSON-RPC endpoint of the node, e.g. `"http://localhost:8545"`.
    pub url: String,
    /// Per-request timeout. `None` means requests never time out.
    pub timeout: Option<Duration>,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RPC_ADDRESS.to_string(),
            timeout: None,
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_EXPORTER_PORT)),
        }
    }
}

/// Configuration for the poll loop.
#[derive(Clone, Debug)]
pub struct PollConfig {
    /// Pause between the end of one cycle and the start of the next.
    pub interval: Duration,
    /// What to do when a cycle fails.
    pub on_failure: FailurePolicy,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_RUN_INTERVAL_SECS),
            on_failure: FailurePolicy::Exit,
        }
    }
}

/// Top-level configuration for the exporter process.
#[derive(Clone, Debug, Default)]
pub struct ExporterConfig {
    pub rpc: RpcClientConfig,
    pub metrics: MetricsConfig,
    pub poll: PollConfig,
}

impl ExporterConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Missing or empty values fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        if let Some(url) = get(ENV_RPC_ADDRESS) {
            cfg.rpc.url = url.trim().to_string();
        }

        if let Some(raw) = get(ENV_RPC_TIMEOUT) {
            let secs = parse_number::<u64>(ENV_RPC_TIMEOUT, &raw)?;
            if secs == 0 {
                return Err(invalid(ENV_RPC_TIMEOUT, &raw, "must be at least 1 second"));
            }
            cfg.rpc.timeout = Some(Duration::from_secs(secs));
        }

        if let Some(raw) = get(ENV_EXPORTER_PORT) {
            let port = parse_number::<u16>(ENV_EXPORTER_PORT, &raw)?;
            cfg.metrics.listen_addr.set_port(port);
        }

        if let Some(raw) = get(ENV_RUN_INTERVAL) {
            let secs = parse_number::<u64>(ENV_RUN_INTERVAL, &raw)?;
            cfg.poll.interval = Duration::from_secs(secs);
        }

        if let Some(raw) = get(ENV_ON_RPC_FAILURE) {
            cfg.poll.on_failure = raw
                .parse()
                .map_err(|reason: String| invalid(ENV_ON_RPC_FAILURE, &raw, reason))?;
        }

        Ok(cfg)
    }
}

fn parse_number<N>(var: &'static str, raw: &str) -> Result<N, ConfigError>
where
    N: std::str::FromStr,
    N::Err: fmt::Display,
{
    raw.trim()
        .parse::<N>()
        .map_err(|e| invalid(var, raw, e.to_string()))
}

fn invalid(var: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError {
        var,
        value: value.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let cfg = ExporterConfig::from_lookup(|_| None).expect("defaults");
        assert_eq!(cfg.rpc.url, "http://localhost:8545");
        assert_eq!(cfg.rpc.timeout, None);
        assert_eq!(cfg.metrics.listen_addr, "0.0.0.0:8000".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.poll.interval, Duration::from_secs(10));
        assert_eq!(cfg.poll.on_failure, FailurePolicy::Exit);
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = ExporterConfig::from_lookup(lookup(&[
            ("RPC_ADDRESS", "http://node:8545"),
            ("EXPORTER_PORT", "9100"),
            ("RUN_INTERVAL", "3"),
            ("RPC_TIMEOUT", "5"),
            ("ON_RPC_FAILURE", "skip"),
        ]))
        .expect("config");

        assert_eq!(cfg.rpc.url, "http://node:8545");
        assert_eq!(cfg.rpc.timeout, Some(Duration::from_secs(5)));
        assert_eq!(cfg.metrics.listen_addr.port(), 9100);
        assert_eq!(cfg.poll.interval, Duration::from_secs(3));
        assert_eq!(cfg.poll.on_failure, FailurePolicy::Skip);
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let cfg = ExporterConfig::from_lookup(lookup(&[("RPC_ADDRESS", ""), ("RUN_INTERVAL", " ")]))
            .expect("config");
        assert_eq!(cfg.rpc.url, "http://localhost:8545");
        assert_eq!(cfg.poll.interval, Duration::from_secs(10));
    }

    #[test]
    fn bad_port_is_rejected() {
        let err = ExporterConfig::from_lookup(lookup(&[("EXPORTER_PORT", "70000")]))
            .expect_err("port out of range");
        assert_eq!(err.var, "EXPORTER_PORT");
        assert!(err.to_string().contains("70000"));
    }

    #[test]
    fn zero_timeout_and_unknown_policy_are_rejected() {
        let err = ExporterConfig::from_lookup(lookup(&[("RPC_TIMEOUT", "0")])).unwrap_err();
        assert_eq!(err.var, "RPC_TIMEOUT");

        let err = ExporterConfig::from_lookup(lookup(&[("ON_RPC_FAILURE", "retry")])).unwrap_err();
        assert_eq!(err.var, "ON_RPC_FAILURE");
    }
}
