//! # Lotto Runtime
//!
//! Operation layer for the lottery.
//!
//! [`LotteryService`] wraps any [`lotto_core::LotteryStore`] and is what a
//! transport layer calls. It turns raw input into validated requests,
//! retries transaction conflicts with exponential backoff, and records a
//! tracing span plus business metrics for every operation.
//!
//! ## Components
//!
//! - **Service**: [`LotteryService`], one method per lottery operation
//! - **Retry**: [`retry::RetryPolicy`] and [`retry::retry_on_conflict`]
//! - **Metrics**: [`metrics::register_business_metrics`] and the Prometheus [`metrics::MetricsServer`]

/// Retry logic with exponential backoff
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;

mod service;

pub use retry::RetryPolicy;
pub use service::LotteryService;
