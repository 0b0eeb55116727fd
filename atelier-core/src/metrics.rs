//! Checkout metrics
//!
//! Counters are cumulative since start, gauges mirror current storage
//! state, histograms track settlement timing. The service facade records
//! into this collector around every operation; nothing in the engine
//! itself depends on it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::types::Timestamp;

/// Checkout metrics collector
pub struct CheckoutMetrics {
    counters: Arc<Counters>,
    gauges: Arc<RwLock<Gauges>>,
    histograms: Arc<RwLock<Histograms>>,
    start_time: Timestamp,
}

/// Monotonically increasing counts
#[derive(Default)]
struct Counters {
    /// Reservation outcomes
    holds_requested: AtomicU64,
    holds_created: AtomicU64,
    holds_reissued: AtomicU64,
    holds_rejected_out_of_stock: AtomicU64,
    holds_swept: AtomicU64,
    holds_cancelled: AtomicU64,

    /// Purchase lifecycle
    purchases_started: AtomicU64,
    purchases_started_gift: AtomicU64,
    purchases_fulfilled: AtomicU64,
    purchases_fulfilled_gift: AtomicU64,
    purchases_failed: AtomicU64,
    purchases_failed_gift: AtomicU64,

    /// Gift balance movement
    gift_claims: AtomicU64,
    gift_credits: AtomicU64,

    /// Settlement plumbing
    broadcast_attempts: AtomicU64,
    confirmation_timeouts: AtomicU64,

    /// Background passes
    sweep_runs: AtomicU64,
    reconcile_runs: AtomicU64,
    reconciled_fulfilled: AtomicU64,
    reconciled_failed: AtomicU64,
}

/// Point-in-time values refreshed from storage
#[derive(Default, Clone)]
struct Gauges {
    active_reservations: u64,
    pending_purchases: u64,
}

/// Fixed-boundary histogram
#[derive(Clone)]
struct HistogramBuckets {
    /// Bucket upper limits
    boundaries: Vec<f64>,
    /// Count per bucket, one extra for overflow
    counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl HistogramBuckets {
    fn new(boundaries: Vec<f64>) -> Self {
        let num_buckets = boundaries.len() + 1;
        Self {
            boundaries,
            counts: vec![0; num_buckets],
            sum: 0.0,
            count: 0,
        }
    }

    fn observe(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        for (i, boundary) in self.boundaries.iter().enumerate() {
            if value <= *boundary {
                self.counts[i] += 1;
                return;
            }
        }
        *self.counts.last_mut().unwrap() += 1;
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    fn percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let target = (self.count as f64 * p / 100.0).ceil() as u64;
        let mut cumulative = 0u64;
        for (i, count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                if i < self.boundaries.len() {
                    return self.boundaries[i];
                }
                return *self.boundaries.last().unwrap_or(&0.0);
            }
        }
        *self.boundaries.last().unwrap_or(&0.0)
    }
}

struct Histograms {
    /// Purchase creation to fulfilled, in seconds
    settlement_time: HistogramBuckets,
    /// Wall-clock duration of a submit call, in seconds
    submit_duration: HistogramBuckets,
}

impl Default for CheckoutMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckoutMetrics {
    /// Create a collector
    pub fn new() -> Self {
        let histograms = Histograms {
            settlement_time: HistogramBuckets::new(vec![
                1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0,
            ]),
            submit_duration: HistogramBuckets::new(vec![
                0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0,
            ]),
        };
        Self {
            counters: Arc::new(Counters::default()),
            gauges: Arc::new(RwLock::new(Gauges::default())),
            histograms: Arc::new(RwLock::new(histograms)),
            start_time: Timestamp::now(),
        }
    }

    // ========== counters ==========

    /// A hold was requested
    pub fn hold_requested(&self) {
        self.counters.holds_requested.fetch_add(1, Ordering::Relaxed);
    }

    /// A hold was granted; `reissued` when an existing triple came back
    pub fn hold_granted(&self, reissued: bool) {
        if reissued {
            self.counters.holds_reissued.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.holds_created.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A hold was refused for lack of capacity
    pub fn hold_rejected_out_of_stock(&self) {
        self.counters
            .holds_rejected_out_of_stock
            .fetch_add(1, Ordering::Relaxed);
    }

    /// A hold was cancelled before settlement
    pub fn hold_cancelled(&self) {
        self.counters.holds_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// A purchase row was created
    pub fn purchase_started(&self, gift: bool) {
        self.counters.purchases_started.fetch_add(1, Ordering::Relaxed);
        if gift {
            self.counters
                .purchases_started_gift
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A purchase reached `fulfilled`
    pub fn purchase_fulfilled(&self, gift: bool) {
        self.counters.purchases_fulfilled.fetch_add(1, Ordering::Relaxed);
        if gift {
            self.counters
                .purchases_fulfilled_gift
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A purchase reached `failed`
    pub fn purchase_failed(&self, gift: bool) {
        self.counters.purchases_failed.fetch_add(1, Ordering::Relaxed);
        if gift {
            self.counters
                .purchases_failed_gift
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A gift balance unit was claimed
    pub fn gift_claimed(&self) {
        self.counters.gift_claims.fetch_add(1, Ordering::Relaxed);
    }

    /// A gift balance was credited
    pub fn gift_credited(&self) {
        self.counters.gift_credits.fetch_add(1, Ordering::Relaxed);
    }

    /// A bundle broadcast was attempted
    pub fn broadcast_attempted(&self) {
        self.counters.broadcast_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Confirmation polling exhausted its budget
    pub fn confirmation_timed_out(&self) {
        self.counters
            .confirmation_timeouts
            .fetch_add(1, Ordering::Relaxed);
    }

    /// A cleanup sweep finished, expiring `expired` holds
    pub fn sweep_completed(&self, expired: u64) {
        self.counters.sweep_runs.fetch_add(1, Ordering::Relaxed);
        self.counters.holds_swept.fetch_add(expired, Ordering::Relaxed);
    }

    /// A reconciliation pass finished
    pub fn reconcile_completed(&self, fulfilled: u64, failed: u64) {
        self.counters.reconcile_runs.fetch_add(1, Ordering::Relaxed);
        self.counters
            .reconciled_fulfilled
            .fetch_add(fulfilled, Ordering::Relaxed);
        self.counters
            .reconciled_failed
            .fetch_add(failed, Ordering::Relaxed);
    }

    // ========== gauges ==========

    /// Refresh storage-derived gauges
    pub async fn set_storage_state(&self, active_reservations: u64, pending_purchases: u64) {
        let mut gauges = self.gauges.write().await;
        gauges.active_reservations = active_reservations;
        gauges.pending_purchases = pending_purchases;
    }

    // ========== histograms ==========

    /// Record how long a purchase took from creation to fulfilled
    pub async fn observe_settlement_time(&self, duration: Duration) {
        let mut histograms = self.histograms.write().await;
        histograms.settlement_time.observe(duration.as_secs_f64());
    }

    /// Record the wall-clock duration of a submit call
    pub async fn observe_submit_duration(&self, duration: Duration) {
        let mut histograms = self.histograms.write().await;
        histograms.submit_duration.observe(duration.as_secs_f64());
    }

    // ========== snapshot ==========

    /// Snapshot every metric
    pub async fn snapshot(&self) -> MetricsSnapshot {
        let gauges = self.gauges.read().await.clone();
        let histograms = self.histograms.read().await;
        let summarize = |h: &HistogramBuckets| HistogramSummary {
            count: h.count,
            sum: h.sum,
            mean: h.mean(),
            p50: h.percentile(50.0),
            p95: h.percentile(95.0),
            p99: h.percentile(99.0),
        };

        MetricsSnapshot {
            holds_requested: self.counters.holds_requested.load(Ordering::Relaxed),
            holds_created: self.counters.holds_created.load(Ordering::Relaxed),
            holds_reissued: self.counters.holds_reissued.load(Ordering::Relaxed),
            holds_rejected_out_of_stock: self
                .counters
                .holds_rejected_out_of_stock
                .load(Ordering::Relaxed),
            holds_swept: self.counters.holds_swept.load(Ordering::Relaxed),
            holds_cancelled: self.counters.holds_cancelled.load(Ordering::Relaxed),
            purchases_started: self.counters.purchases_started.load(Ordering::Relaxed),
            purchases_started_gift: self.counters.purchases_started_gift.load(Ordering::Relaxed),
            purchases_fulfilled: self.counters.purchases_fulfilled.load(Ordering::Relaxed),
            purchases_fulfilled_gift: self
                .counters
                .purchases_fulfilled_gift
                .load(Ordering::Relaxed),
            purchases_failed: self.counters.purchases_failed.load(Ordering::Relaxed),
            purchases_failed_gift: self.counters.purchases_failed_gift.load(Ordering::Relaxed),
            gift_claims: self.counters.gift_claims.load(Ordering::Relaxed),
            gift_credits: self.counters.gift_credits.load(Ordering::Relaxed),
            broadcast_attempts: self.counters.broadcast_attempts.load(Ordering::Relaxed),
            confirmation_timeouts: self.counters.confirmation_timeouts.load(Ordering::Relaxed),
            sweep_runs: self.counters.sweep_runs.load(Ordering::Relaxed),
            reconcile_runs: self.counters.reconcile_runs.load(Ordering::Relaxed),
            reconciled_fulfilled: self.counters.reconciled_fulfilled.load(Ordering::Relaxed),
            reconciled_failed: self.counters.reconciled_failed.load(Ordering::Relaxed),

            active_reservations: gauges.active_reservations,
            pending_purchases: gauges.pending_purchases,

            settlement_time: summarize(&histograms.settlement_time),
            submit_duration: summarize(&histograms.submit_duration),

            uptime_secs: Timestamp::now()
                .as_millis()
                .saturating_sub(self.start_time.as_millis())
                / 1000,
            snapshot_at: Timestamp::now(),
        }
    }

    /// Prometheus text exposition
    pub async fn prometheus_export(&self) -> String {
        let snapshot = self.snapshot().await;
        let mut output = String::new();

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!(
            "atelier_holds_requested_total",
            "Reservation requests received",
            "counter",
            snapshot.holds_requested
        );
        metric!(
            "atelier_holds_created_total",
            "New reservations created",
            "counter",
            snapshot.holds_created
        );
        metric!(
            "atelier_holds_reissued_total",
            "Reservations re-issued for an existing triple",
            "counter",
            snapshot.holds_reissued
        );
        metric!(
            "atelier_holds_rejected_out_of_stock_total",
            "Reservations refused for lack of capacity",
            "counter",
            snapshot.holds_rejected_out_of_stock
        );
        metric!(
            "atelier_holds_swept_total",
            "Lapsed reservations expired by sweeps",
            "counter",
            snapshot.holds_swept
        );
        metric!(
            "atelier_holds_cancelled_total",
            "Reservations cancelled before settlement",
            "counter",
            snapshot.holds_cancelled
        );
        metric!(
            "atelier_purchases_started_total",
            "Purchase rows created",
            "counter",
            snapshot.purchases_started
        );
        output.push_str(&format!(
            "atelier_purchases_started_total{{path=\"gift\"}} {}\n",
            snapshot.purchases_started_gift
        ));
        metric!(
            "atelier_purchases_fulfilled_total",
            "Purchases fulfilled",
            "counter",
            snapshot.purchases_fulfilled
        );
        output.push_str(&format!(
            "atelier_purchases_fulfilled_total{{path=\"gift\"}} {}\n",
            snapshot.purchases_fulfilled_gift
        ));
        metric!(
            "atelier_purchases_failed_total",
            "Purchases failed",
            "counter",
            snapshot.purchases_failed
        );
        metric!(
            "atelier_gift_claims_total",
            "Gift balance units claimed",
            "counter",
            snapshot.gift_claims
        );
        metric!(
            "atelier_broadcast_attempts_total",
            "Bundle broadcast attempts",
            "counter",
            snapshot.broadcast_attempts
        );
        metric!(
            "atelier_confirmation_timeouts_total",
            "Confirmation polls that exhausted their budget",
            "counter",
            snapshot.confirmation_timeouts
        );
        metric!(
            "atelier_sweep_runs_total",
            "Cleanup sweep passes",
            "counter",
            snapshot.sweep_runs
        );
        metric!(
            "atelier_reconcile_runs_total",
            "Reconciliation passes",
            "counter",
            snapshot.reconcile_runs
        );

        metric!(
            "atelier_active_reservations",
            "Currently live holds",
            "gauge",
            snapshot.active_reservations
        );
        metric!(
            "atelier_pending_purchases",
            "Purchases awaiting settlement",
            "gauge",
            snapshot.pending_purchases
        );
        metric!(
            "atelier_uptime_seconds",
            "Collector uptime in seconds",
            "gauge",
            snapshot.uptime_secs
        );

        output.push_str(&format!(
            "# HELP atelier_settlement_time_seconds Purchase creation to fulfilled\n\
             # TYPE atelier_settlement_time_seconds histogram\n\
             atelier_settlement_time_seconds_count {}\n\
             atelier_settlement_time_seconds_sum {}\n",
            snapshot.settlement_time.count, snapshot.settlement_time.sum
        ));
        output.push_str(&format!(
            "# HELP atelier_submit_duration_seconds Wall-clock submit duration\n\
             # TYPE atelier_submit_duration_seconds histogram\n\
             atelier_submit_duration_seconds_count {}\n\
             atelier_submit_duration_seconds_sum {}\n",
            snapshot.submit_duration.count, snapshot.submit_duration.sum
        ));

        output
    }
}

/// Histogram summary statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct HistogramSummary {
    pub count: u64,
    pub sum: f64,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Complete metrics snapshot
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub holds_requested: u64,
    pub holds_created: u64,
    pub holds_reissued: u64,
    pub holds_rejected_out_of_stock: u64,
    pub holds_swept: u64,
    pub holds_cancelled: u64,
    pub purchases_started: u64,
    pub purchases_started_gift: u64,
    pub purchases_fulfilled: u64,
    pub purchases_fulfilled_gift: u64,
    pub purchases_failed: u64,
    pub purchases_failed_gift: u64,
    pub gift_claims: u64,
    pub gift_credits: u64,
    pub broadcast_attempts: u64,
    pub confirmation_timeouts: u64,
    pub sweep_runs: u64,
    pub reconcile_runs: u64,
    pub reconciled_fulfilled: u64,
    pub reconciled_failed: u64,

    pub active_reservations: u64,
    pub pending_purchases: u64,

    pub settlement_time: HistogramSummary,
    pub submit_duration: HistogramSummary,

    pub uptime_secs: u64,
    pub snapshot_at: Timestamp,
}

impl MetricsSnapshot {
    /// Share of settled purchases that fulfilled, as a percentage
    pub fn fulfillment_rate(&self) -> f64 {
        let settled = self.purchases_fulfilled + self.purchases_failed;
        if settled == 0 {
            100.0
        } else {
            (self.purchases_fulfilled as f64 / settled as f64) * 100.0
        }
    }
}
