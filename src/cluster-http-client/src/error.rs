//! Crate-wide error type.
//!
//! Configuration-time failures (rejected before a [`crate::Client`] exists)
//! live here. Per-request outcomes are not errors — they are a
//! [`crate::result::ClusterResultStatus`], since a request that fails every
//! replica is a normal, fully-formed result, not an exceptional one.

use thiserror::Error;

/// Errors that can occur while building or validating a [`crate::Client`].
#[derive(Error, Debug)]
pub enum Error {
    /// No [`crate::transport::Transport`] was configured.
    #[error("transport must be configured")]
    TransportUnset,

    /// No [`crate::transport::ClusterProvider`] was configured.
    #[error("cluster provider must be configured")]
    ClusterProviderUnset,

    /// A user-supplied list (modifiers, criteria, transforms) contained an
    /// empty or otherwise invalid entry.
    #[error("{field} must not be empty")]
    EmptyList {
        /// Name of the offending configuration field.
        field: &'static str,
    },

    /// The last entry of a response criteria list was not a terminal
    /// criterion (`AlwaysAccept` / `AlwaysReject`).
    #[error("the last response criterion in a criteria list must be terminal")]
    NonTerminalCriteria,

    /// `defaultTimeout` was zero or negative.
    #[error("default timeout must be positive, got {0:?}")]
    NonPositiveTimeout(std::time::Duration),

    /// `maxReplicasUsedPerRequest` was zero or negative.
    #[error("maxReplicasUsedPerRequest must be positive, got {0}")]
    NonPositiveReplicaCap(i64),

    /// No weight modifiers were registered; the ordering engine has nothing
    /// to compose into a per-replica weight.
    #[error("at least one weight modifier must be registered")]
    NoWeightModifiers,

    /// Registering this client's metric collectors failed, almost always
    /// because a metric name collides with one already in the registry.
    #[error("failed to register client metrics: {0}")]
    MetricsRegistration(#[source] prometheus::Error),
}

/// Convenience alias for configuration-time results.
pub type Result<T> = std::result::Result<T, Error>;
