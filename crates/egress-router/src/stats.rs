//! Atomic routing statistics counters.
//!
//! All atomics use `Relaxed` ordering: these are monotonic display counters
//! with no synchronization requirements, safe to bump on the decision path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::target::RoutingDecision;

#[derive(Default)]
struct StatsInner {
    direct_decisions: AtomicU64,
    proxied_decisions: AtomicU64,
    connect_failures: AtomicU64,
    proxy_sets: AtomicU64,
    proxy_clears: AtomicU64,
}

/// Thread-safe routing statistics. Cheap to clone (Arc).
#[derive(Clone, Default)]
pub struct RouteStats {
    inner: Arc<StatsInner>,
}

/// Snapshot of current stats values, serializable to JSON.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub direct_decisions: u64,
    pub proxied_decisions: u64,
    pub connect_failures: u64,
    pub proxy_sets: u64,
    pub proxy_clears: u64,
}

impl RouteStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_decision(&self, decision: &RoutingDecision) {
        let counter = match decision {
            RoutingDecision::Direct => &self.inner.direct_decisions,
            RoutingDecision::ViaProxy(_) => &self.inner.proxied_decisions,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_connect_failures(&self) {
        self.inner.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sets(&self) {
        self.inner.proxy_sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_clears(&self) {
        self.inner.proxy_clears.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            direct_decisions: self.inner.direct_decisions.load(Ordering::Relaxed),
            proxied_decisions: self.inner.proxied_decisions.load(Ordering::Relaxed),
            connect_failures: self.inner.connect_failures.load(Ordering::Relaxed),
            proxy_sets: self.inner.proxy_sets.load(Ordering::Relaxed),
            proxy_clears: self.inner.proxy_clears.load(Ordering::Relaxed),
        }
    }
}
