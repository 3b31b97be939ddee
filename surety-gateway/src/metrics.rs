//! Metrics collection for observability
//!
//! Prometheus metrics for the gateway, registered on a per-gateway registry.
//!
//! # Metrics
//!
//! - `surety_airlines_registered_total` - Candidates that became Registered
//! - `surety_votes_cast_total` - Ballot votes accepted
//! - `surety_airlines_funded_total` - Airlines that crossed the funding minimum
//! - `surety_flights_registered_total` - Flights recorded
//! - `surety_policies_sold_total` - Policies purchased
//! - `surety_status_reports_total` - Flight statuses recorded
//! - `surety_payouts_credited_total` - Policies credited
//! - `surety_withdrawals_total` - Completed withdrawals
//! - `surety_rejected_calls_total` - Rejected entry-point calls, by operation and kind

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Candidates registered
    pub airlines_registered: IntCounter,

    /// Votes accepted
    pub votes_cast: IntCounter,

    /// Airlines funded
    pub airlines_funded: IntCounter,

    /// Flights registered
    pub flights_registered: IntCounter,

    /// Policies sold
    pub policies_sold: IntCounter,

    /// Status reports recorded
    pub status_reports: IntCounter,

    /// Policies credited
    pub payouts_credited: IntCounter,

    /// Withdrawals completed
    pub withdrawals: IntCounter,

    /// Rejected calls
    pub rejected_calls: IntCounterVec,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("airlines_registered", &self.airlines_registered.get())
            .field("policies_sold", &self.policies_sold.get())
            .field("payouts_credited", &self.payouts_credited.get())
            .field("withdrawals", &self.withdrawals.get())
            .finish()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let counter = |name: &str, help: &str| -> prometheus::Result<IntCounter> {
            let counter = IntCounter::new(name, help)?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        let airlines_registered = counter(
            "surety_airlines_registered_total",
            "Candidates that became Registered",
        )?;
        let votes_cast = counter("surety_votes_cast_total", "Ballot votes accepted")?;
        let airlines_funded = counter(
            "surety_airlines_funded_total",
            "Airlines that crossed the funding minimum",
        )?;
        let flights_registered =
            counter("surety_flights_registered_total", "Flights recorded")?;
        let policies_sold = counter("surety_policies_sold_total", "Policies purchased")?;
        let status_reports = counter("surety_status_reports_total", "Flight statuses recorded")?;
        let payouts_credited = counter("surety_payouts_credited_total", "Policies credited")?;
        let withdrawals = counter("surety_withdrawals_total", "Completed withdrawals")?;

        let rejected_calls = IntCounterVec::new(
            Opts::new("surety_rejected_calls_total", "Rejected entry-point calls"),
            &["operation", "kind"],
        )?;
        registry.register(Box::new(rejected_calls.clone()))?;

        Ok(Self {
            airlines_registered,
            votes_cast,
            airlines_funded,
            flights_registered,
            policies_sold,
            status_reports,
            payouts_credited,
            withdrawals,
            rejected_calls,
            registry,
        })
    }

    /// Record a rejected call
    pub fn record_rejection(&self, operation: &str, kind: &str) {
        self.rejected_calls
            .with_label_values(&[operation, kind])
            .inc();
    }

    /// Rejections so far for (operation, kind)
    pub fn rejections(&self, operation: &str, kind: &str) -> u64 {
        self.rejected_calls
            .with_label_values(&[operation, kind])
            .get()
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
