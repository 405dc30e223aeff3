//! Prometheus metrics for the escrow core
//!
//! # Metrics
//!
//! - `escrow_settlements_total` - Completed settlements
//! - `escrow_settlement_faults_total` - Pending settlement faults surfaced
//! - `escrow_listings_created_total` - Listings created
//! - `escrow_listings_cancelled_total` - Listings cancelled
//! - `escrow_reconciliation_runs_total` - Reconciliation passes executed
//! - `escrow_orphaned_tokens` - Orphans found by the last reconciliation pass
//! - `escrow_stale_listings` - Stale listings found by the last pass

use prometheus::{IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics collector. The registry is instance-owned so multiple engines can
/// coexist in one process without name collisions.
#[derive(Clone)]
pub struct Metrics {
    pub settlements_total: IntCounter,
    pub settlement_faults_total: IntCounter,
    pub listings_created_total: IntCounter,
    pub listings_cancelled_total: IntCounter,
    pub reconciliation_runs_total: IntCounter,
    pub orphaned_tokens: IntGauge,
    pub stale_listings: IntGauge,
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let settlements_total =
            IntCounter::new("escrow_settlements_total", "Completed settlements")?;
        registry.register(Box::new(settlements_total.clone()))?;

        let settlement_faults_total = IntCounter::new(
            "escrow_settlement_faults_total",
            "Pending settlement faults surfaced",
        )?;
        registry.register(Box::new(settlement_faults_total.clone()))?;

        let listings_created_total =
            IntCounter::new("escrow_listings_created_total", "Listings created")?;
        registry.register(Box::new(listings_created_total.clone()))?;

        let listings_cancelled_total =
            IntCounter::new("escrow_listings_cancelled_total", "Listings cancelled")?;
        registry.register(Box::new(listings_cancelled_total.clone()))?;

        let reconciliation_runs_total = IntCounter::new(
            "escrow_reconciliation_runs_total",
            "Reconciliation passes executed",
        )?;
        registry.register(Box::new(reconciliation_runs_total.clone()))?;

        let orphaned_tokens = IntGauge::new(
            "escrow_orphaned_tokens",
            "Orphans found by the last reconciliation pass",
        )?;
        registry.register(Box::new(orphaned_tokens.clone()))?;

        let stale_listings = IntGauge::new(
            "escrow_stale_listings",
            "Stale listings found by the last reconciliation pass",
        )?;
        registry.register(Box::new(stale_listings.clone()))?;

        Ok(Self {
            settlements_total,
            settlement_faults_total,
            listings_created_total,
            listings_cancelled_total,
            reconciliation_runs_total,
            orphaned_tokens,
            stale_listings,
            registry,
        })
    }

    pub fn record_settlement(&self) {
        self.settlements_total.inc();
    }

    pub fn record_settlement_fault(&self) {
        self.settlement_faults_total.inc();
    }

    pub fn record_listing_created(&self) {
        self.listings_created_total.inc();
    }

    pub fn record_listing_cancelled(&self) {
        self.listings_cancelled_total.inc();
    }

    pub fn record_reconciliation(&self, orphaned: usize, stale: usize) {
        self.reconciliation_runs_total.inc();
        self.orphaned_tokens.set(orphaned as i64);
        self.stale_listings.set(stale as i64);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}
