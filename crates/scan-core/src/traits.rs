use crate::{
    AggregatedMarketData, DividendInfo, Fundamentals, MarketData, OptionContract, Recommendation,
    ScanError, Symbol, TrendAnalysis,
};
use async_trait::async_trait;

/// A pluggable scoring strategy (spec §4.2).
///
/// Implementations must be a pure function of `AggregatedMarketData`: no
/// I/O, no hidden state, deterministic given identical inputs (spec §8.6).
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn target_expiry_min_days(&self) -> i64;
    fn target_expiry_max_days(&self) -> i64;

    fn evaluate(&self, symbol: &Symbol, data: &AggregatedMarketData) -> Vec<Recommendation>;
}

/// Price history + trend analysis (spec §2 C2, §6).
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_market_data(&self, symbol: &Symbol) -> Result<Option<MarketData>, ScanError>;
    async fn analyse_trend(
        &self,
        symbol: &Symbol,
        days: i64,
    ) -> Result<TrendAnalysis, ScanError>;
    async fn get_dividends(&self, symbol: &Symbol) -> Result<Vec<DividendInfo>, ScanError>;
}

/// Option-chain data, authenticated and rate-limited (spec §2 C3, §6).
#[async_trait]
pub trait OptionsDataProvider: Send + Sync {
    async fn get_short_term_put_options(
        &self,
        symbol: &Symbol,
        min_days: i64,
        max_days: i64,
    ) -> Result<Vec<OptionContract>, ScanError>;
}

/// Bulk fundamentals ingest + per-symbol lookup (spec §2 C4, §6).
#[async_trait]
pub trait FundamentalsProvider: Send + Sync {
    async fn get_by_symbol(&self, symbol: &Symbol) -> Result<Option<Fundamentals>, ScanError>;
}

/// Candidate-universe discovery from the options exchange (spec §2 C5, §6).
#[async_trait]
pub trait OptionsDiscoveryService: Send + Sync {
    async fn discover_underlyings(&self) -> Result<Vec<Symbol>, ScanError>;
}

/// Composes [`MarketDataProvider`] + [`OptionsDataProvider`] +
/// [`FundamentalsProvider`] into one [`AggregatedMarketData`] snapshot per
/// symbol (spec §2 C6, §4.5). Pulled out as a trait — rather than naming
/// the concrete `market-data-aggregator` type directly — so `scan-orchestrator`
/// can be exercised against an in-memory fake for the event-bracketing and
/// cancellation property tests (spec §8) without spinning up real HTTP
/// adapters.
#[async_trait]
pub trait MarketAggregator: Send + Sync {
    async fn aggregate(&self, symbol: &Symbol) -> Result<AggregatedMarketData, ScanError>;
}
