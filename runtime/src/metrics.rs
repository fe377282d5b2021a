//! Prometheus metrics for the lottery operations.
//!
//! Business counters are recorded through the `metrics` facade by
//! [`crate::LotteryService`]; [`MetricsServer`] installs the Prometheus
//! recorder and serves them over HTTP.
//!
//! # Example
//!
//! ```rust,no_run
//! use lotto_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use lotto_core::{LotteryError, SettlementSummary};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server bound to `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Describe the lottery metrics, install the recorder and spawn the
    /// HTTP listener.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built. An already installed
    /// global recorder is logged and tolerated.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        if let Err(e) = metrics::set_global_recorder(recorder) {
            tracing::warn!(error = %e, "Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }

        register_business_metrics();
        tokio::spawn(async move {
            // ExporterError implements neither Debug nor Display
            if exporter.await.is_err() {
                tracing::error!("Metrics exporter stopped");
            }
        });
        self.handle = Some(handle);
        tracing::info!(addr = %self.addr, "Metrics server started - available at http://{}/metrics", self.addr);
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Describe every lottery metric.
pub fn register_business_metrics() {
    describe_counter!(
        "lotto_purchases_total",
        "Purchase attempts by outcome (success or error kind)"
    );
    describe_counter!("lotto_tickets_sold_total", "Tickets sold");
    describe_counter!(
        "lotto_purchase_revenue_minor_total",
        "Revenue from committed purchases, in minor units"
    );
    describe_counter!("lotto_settlements_total", "Committed settlements");
    describe_counter!(
        "lotto_lines_settled_total",
        "Purchase lines reclassified by settlement, by result"
    );
    describe_counter!(
        "lotto_claims_total",
        "Claim attempts by outcome (success or error kind)"
    );
    describe_counter!(
        "lotto_claim_payout_minor_total",
        "Prize money paid out, in minor units"
    );
    describe_counter!(
        "lotto_operation_retries_total",
        "Retries after transaction conflicts, by operation"
    );
    describe_histogram!(
        "lotto_operation_duration_seconds",
        "Wall time of lottery operations including retries"
    );
}

fn outcome<T>(result: &Result<T, LotteryError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(err) => err.kind(),
    }
}

fn as_count(minor: i64) -> u64 {
    u64::try_from(minor).unwrap_or(0)
}

/// Purchase metrics recorder.
pub struct PurchaseMetrics;

impl PurchaseMetrics {
    /// Record a purchase attempt.
    pub fn record<T>(result: &Result<T, LotteryError>) {
        counter!("lotto_purchases_total", "outcome" => outcome(result)).increment(1);
    }

    /// Record a committed sale.
    pub fn record_sale(tickets: usize, revenue_minor: i64) {
        counter!("lotto_tickets_sold_total").increment(tickets as u64);
        counter!("lotto_purchase_revenue_minor_total").increment(as_count(revenue_minor));
    }
}

/// Settlement metrics recorder.
pub struct SettlementMetrics;

impl SettlementMetrics {
    /// Record a committed settlement.
    pub fn record(summary: &SettlementSummary) {
        counter!("lotto_settlements_total").increment(1);
        counter!("lotto_lines_settled_total", "result" => "won").increment(summary.lines_won);
        counter!("lotto_lines_settled_total", "result" => "lost").increment(summary.lines_lost);
    }
}

/// Claim metrics recorder.
pub struct ClaimMetrics;

impl ClaimMetrics {
    /// Record a claim attempt.
    pub fn record<T>(result: &Result<T, LotteryError>) {
        counter!("lotto_claims_total", "outcome" => outcome(result)).increment(1);
    }

    /// Record a payout.
    pub fn record_payout(prize_minor: i64) {
        counter!("lotto_claim_payout_minor_total").increment(as_count(prize_minor));
    }
}

/// Operation timing recorder.
pub struct OperationMetrics;

impl OperationMetrics {
    /// Record how long an operation took.
    pub fn record_duration(operation: &'static str, duration: Duration) {
        histogram!("lotto_operation_duration_seconds", "operation" => operation)
            .record(duration.as_secs_f64());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_server_creation() {
        let server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(outcome::<()>(&Ok(())), "success");
        assert_eq!(
            outcome::<()>(&Err(LotteryError::EmptyRequest)),
            "empty_request"
        );
    }

    #[test]
    fn test_recorders_without_installed_recorder() {
        // The facade is a no-op until a recorder is installed.
        register_business_metrics();
        PurchaseMetrics::record::<()>(&Ok(()));
        PurchaseMetrics::record_sale(2, 16_000);
        ClaimMetrics::record_payout(-5);
        SettlementMetrics::record(&SettlementSummary::default());
        OperationMetrics::record_duration("purchase", Duration::from_millis(3));
    }

    #[tokio::test]
    async fn test_metrics_server_render() {
        let mut server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        server.start().unwrap();

        PurchaseMetrics::record_sale(1, 8_000);

        // Another test may have installed the recorder first.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("lotto_tickets_sold_total"));
        }
    }
}
