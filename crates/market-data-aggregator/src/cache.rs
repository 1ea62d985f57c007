use chrono::{DateTime, Utc};
use scan_core::AggregatedMarketData;

/// A cached [`AggregatedMarketData`] snapshot plus the instant it was
/// produced (spec §4.5 "5-minute cache"). Caching the whole bundle rather
/// than per-provider results keeps the merge logic in one place and
/// matches the teacher's `AnalysisOrchestrator` cache entries
/// (`analysis-orchestrator/src/lib.rs`), which are likewise whole-value,
/// timestamped, TTL-checked `DashMap` entries rather than per-field caches.
#[derive(Clone)]
pub struct CacheEntry {
    pub data: AggregatedMarketData,
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_fresh(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.cached_at < ttl
    }
}
