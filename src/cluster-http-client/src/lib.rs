//! A cluster-aware HTTP client.
//!
//! Given a logical service name (via a [`transport::ClusterProvider`]), this
//! crate discovers the set of candidate replicas serving it and dispatches
//! each logical request to one or more of those replicas according to a
//! configurable policy: ordering and health-based weighting
//! ([`ordering`], [`weight`], [`health`]), retry/hedging/parallel dispatch
//! ([`strategy`], [`retry`]), and deadline semantics ([`budget`]) — all
//! wired together by a layered, nestable request-processing pipeline
//! ([`pipeline`]).
//!
//! The concrete HTTP transport, topology discovery, and byte-level wire
//! formats are out of scope: callers implement the narrow collaborator
//! traits in [`transport`] and hand them to a [`Client`] via
//! [`ClientBuilder`].

pub mod budget;
pub mod classifier;
mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod health;
pub mod metrics;
pub mod ordering;
pub mod pipeline;
pub mod replica;
pub mod request;
pub mod response;
pub mod result;
pub mod retry;
pub mod sender;
pub mod storage;
pub mod strategy;
pub mod transport;
pub mod weight;

pub use budget::TimeBudget;
pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, RequestParameters};
pub use error::{Error, Result};
pub use replica::Replica;
pub use request::{Body, Headers, Method, Request};
pub use response::{Response, StatusCode, TransportVerdict, Verdict};
pub use result::{ClusterResult, ClusterResultStatus};
