//! Client configuration: enumerated options, their effects, and the
//! validation rules applied when a [`crate::Client`] is built.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::ReplicaStorageScope;
use crate::strategy::StrategyConfig;

/// Per-request overrides a caller may attach to a single logical request.
#[derive(Debug, Clone, Default)]
pub struct RequestParameters {
    /// Caller-assigned priority, available to modules that branch on it
    /// (e.g. a priority-aware Logging module).
    pub priority: i32,
    /// Free-form properties modules may read; not interpreted by the core.
    pub custom: std::collections::BTreeMap<String, String>,
    /// Overrides `ClientConfig::default_timeout` for this one request.
    /// Validated by the `TimeoutValidation` module: zero/negative is
    /// rejected, anything exceeding `ClientConfig::default_timeout` is
    /// trimmed back down to it.
    pub timeout_override: Option<Duration>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub log_request_details: bool,
    pub log_result_details: bool,
    pub log_replica_requests: bool,
    pub log_replica_results: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_request_details: true,
            log_result_details: true,
            log_replica_requests: false,
            log_replica_results: false,
        }
    }
}

/// Optional standard throttling parameters (mentioned in configuration;
/// server-side load-shedding itself is a non-goal, but a client may still
/// want to locally estimate a rejection probability from its own recent
/// attempt history before dispatching more load at an already-struggling
/// cluster).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdaptiveThrottlingConfig {
    pub minimum_requests: u32,
    pub minimum_ratio: f64,
    pub rejection_probability_cap: f64,
}

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub default_timeout: Duration,
    /// Bounds connection establishment specifically; separate from the
    /// per-attempt request timeout a strategy computes from the budget
    ///.
    pub connection_timeout: Duration,
    pub max_replicas_used_per_request: i64,
    pub replica_storage_scope: ReplicaStorageScope,
    pub deduplicate_request_url: bool,
    pub validate_http_method: bool,
    pub logging: LoggingConfig,
    pub adaptive_throttling: Option<AdaptiveThrottlingConfig>,
    /// Cap on the weight any single replica's modifier chain may produce.
    pub max_weight: f64,
    pub strategy: StrategyConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            default_timeout: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(5),
            max_replicas_used_per_request: i64::MAX,
            replica_storage_scope: ReplicaStorageScope::Process,
            deduplicate_request_url: true,
            validate_http_method: true,
            logging: LoggingConfig::default(),
            adaptive_throttling: None,
            max_weight: 100.0,
            strategy: StrategyConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Checks the static validation rules that apply to the config alone
    /// (list-emptiness and criteria-list checks happen where those lists
    /// are actually registered, since `ClientConfig` does not hold them).
    pub fn validate(&self) -> Result<()> {
        if self.default_timeout.is_zero() {
            return Err(Error::NonPositiveTimeout(self.default_timeout));
        }
        if self.max_replicas_used_per_request <= 0 {
            return Err(Error::NonPositiveReplicaCap(
                self.max_replicas_used_per_request,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        ClientConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut config = ClientConfig::default();
        config.default_timeout = Duration::ZERO;
        assert!(matches!(
            config.validate(),
            Err(Error::NonPositiveTimeout(_))
        ));
    }

    #[test]
    fn non_positive_replica_cap_rejected() {
        let mut config = ClientConfig::default();
        config.max_replicas_used_per_request = 0;
        assert!(matches!(
            config.validate(),
            Err(Error::NonPositiveReplicaCap(_))
        ));
    }
}
