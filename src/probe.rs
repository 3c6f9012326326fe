use std::time::Duration;

use async_trait::async_trait;

pub mod http;

pub use http::HttpProber;

/// Result of the lightweight network check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reachability {
    Reachable,
    Unreachable(String),
    TimedOut,
}

/// Result of running the external media tool against a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaOutcome {
    Decodable,
    NotDecodable(String),
    TimedOut,
}

/// Checks that an endpoint answers at all, without downloading its body
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// `timeout` is the budget for the whole check. Callers enforce it as well, a check
    /// still running past it is dropped.
    async fn check(&self, url: &str, timeout: Duration) -> Reachability;
}

/// Checks that an endpoint serves media that actually decodes
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Implementations must not leave anything running once they return or are dropped.
    /// Callers drop a probe that runs well past `timeout`.
    async fn probe(&self, url: &str, timeout: Duration) -> MediaOutcome;
}
