//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `ledger_transactions_admitted_total` - Transactions accepted into the pool
//! - `ledger_transactions_rejected_total` - Transactions refused at admission
//! - `ledger_blocks_committed_total` - Blocks sealed by commit
//! - `ledger_pool_size` - Transactions currently waiting in the pool
//! - `ledger_commit_duration_seconds` - Histogram of commit latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::fmt;
use std::sync::Arc;

/// Metrics collector
///
/// Collectors live in a private registry so several ledgers (and tests) can
/// coexist in one process.
#[derive(Clone)]
pub struct Metrics {
    /// Transactions admitted
    pub transactions_admitted: IntCounter,

    /// Transactions rejected
    pub transactions_rejected: IntCounter,

    /// Blocks committed
    pub blocks_committed: IntCounter,

    /// Current pool size
    pub pool_size: IntGauge,

    /// Commit duration histogram
    pub commit_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transactions_admitted = IntCounter::new(
            "ledger_transactions_admitted_total",
            "Transactions accepted into the pool",
        )?;
        registry.register(Box::new(transactions_admitted.clone()))?;

        let transactions_rejected = IntCounter::new(
            "ledger_transactions_rejected_total",
            "Transactions refused at admission",
        )?;
        registry.register(Box::new(transactions_rejected.clone()))?;

        let blocks_committed = IntCounter::new(
            "ledger_blocks_committed_total",
            "Blocks sealed by commit",
        )?;
        registry.register(Box::new(blocks_committed.clone()))?;

        let pool_size = IntGauge::new(
            "ledger_pool_size",
            "Transactions currently waiting in the pool",
        )?;
        registry.register(Box::new(pool_size.clone()))?;

        let commit_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_commit_duration_seconds",
                "Histogram of commit latencies",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.010, 0.050, 0.100]),
        )?;
        registry.register(Box::new(commit_duration.clone()))?;

        Ok(Self {
            transactions_admitted,
            transactions_rejected,
            blocks_committed,
            pool_size,
            commit_duration,
            registry,
        })
    }

    /// Record admission outcome
    pub fn record_admission(&self, admitted: bool) {
        if admitted {
            self.transactions_admitted.inc();
        } else {
            self.transactions_rejected.inc();
        }
    }

    /// Record a successful (non-empty) commit
    pub fn record_commit(&self, duration_seconds: f64) {
        self.blocks_committed.inc();
        self.commit_duration.observe(duration_seconds);
    }

    /// Update pool size gauge
    pub fn update_pool_size(&self, size: usize) {
        self.pool_size.set(size as i64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("transactions_admitted", &self.transactions_admitted.get())
            .field("transactions_rejected", &self.transactions_rejected.get())
            .field("blocks_committed", &self.blocks_committed.get())
            .field("pool_size", &self.pool_size.get())
            .finish_non_exhaustive()
    }
}
