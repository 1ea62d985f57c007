//! Composes C2 (`market-data-client`'s `MarketDataProvider`/`OptionsDataProvider`)
//! and C1 (`stock-data-store`'s persisted fundamentals layer) into one
//! [`AggregatedMarketData`] snapshot per symbol (spec §2 C6, §4.5).
//!
//! Fundamentals are read from the store rather than from a live
//! `FundamentalsProvider` call: the fundamentals layer is bulk-ingested
//! separately (spec §4.3) and is already the "cached" copy the orchestrator
//! is meant to read per-symbol during a scan.

mod cache;

use async_trait::async_trait;
use cache::CacheEntry;
use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use scan_core::{
    AggregatedMarketData, FinancialHealthMetrics, MarketAggregator, MarketDataProvider,
    OptionsDataProvider, ScanError, Symbol,
};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use stock_data_store::StockDataStore;
use tracing::warn;

/// Default trend lookback window fed to `analyse_trend` (spec §6 has no
/// explicit default; 30 days matches the teacher's `trading-agent` scanner
/// loop's lookback for its own trend call).
const TREND_LOOKBACK_DAYS: i64 = 30;

/// Default per-symbol aggregation timeout (spec §4.5).
const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(60);

/// Default whole-bundle cache TTL (spec §4.5 "5-minute cache"), matching
/// the teacher's `analysis-orchestrator` `CACHE_TTL_SECS`.
const DEFAULT_CACHE_TTL_SECS: i64 = 300;

/// Concrete [`MarketAggregator`] implementor. Fans the market-data and
/// options calls out concurrently via `tokio::join!`, reads the
/// fundamentals layer from the store, and merges everything into one
/// [`AggregatedMarketData`] — succeeding unless every source failed.
pub struct DefaultMarketAggregator {
    market: Arc<dyn MarketDataProvider>,
    options: Arc<dyn OptionsDataProvider>,
    store: Arc<StockDataStore>,
    min_expiry_days: i64,
    max_expiry_days: i64,
    timeout: StdDuration,
    cache_ttl: ChronoDuration,
    cache: DashMap<Symbol, CacheEntry>,
}

impl DefaultMarketAggregator {
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        options: Arc<dyn OptionsDataProvider>,
        store: Arc<StockDataStore>,
        min_expiry_days: i64,
        max_expiry_days: i64,
    ) -> Self {
        Self {
            market,
            options,
            store,
            min_expiry_days,
            max_expiry_days,
            timeout: DEFAULT_TIMEOUT,
            cache_ttl: ChronoDuration::seconds(DEFAULT_CACHE_TTL_SECS),
            cache: DashMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: ChronoDuration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    fn cached(&self, symbol: &Symbol) -> Option<AggregatedMarketData> {
        let now = Utc::now();
        self.cache
            .get(symbol)
            .filter(|entry| entry.is_fresh(self.cache_ttl, now))
            .map(|entry| entry.data.clone())
    }

    async fn fetch(&self, symbol: &Symbol) -> Result<AggregatedMarketData, ScanError> {
        let (market_data, trend, options, dividends, stock_row) = tokio::join!(
            self.market.get_market_data(symbol),
            self.market.analyse_trend(symbol, TREND_LOOKBACK_DAYS),
            self.options
                .get_short_term_put_options(symbol, self.min_expiry_days, self.max_expiry_days),
            self.market.get_dividends(symbol),
            self.store.get_by_symbol(symbol),
        );

        let market_data = log_and_discard(market_data, symbol, "market data");
        let trend_analysis = log_and_discard(trend, symbol, "trend analysis");
        let options = options.unwrap_or_else(|e| {
            warn!(%symbol, error = %e, "options lookup failed, proceeding with none");
            Vec::new()
        });
        let dividend_info = log_and_discard(dividends, symbol, "dividends")
            .and_then(|divs| divs.into_iter().max_by_key(|d| d.ex_dividend_date));
        let financial_health = log_and_discard(stock_row, symbol, "fundamentals lookup")
            .flatten()
            .and_then(|row| financial_health_from_row(&row));

        if market_data.is_none()
            && trend_analysis.is_none()
            && options.is_empty()
            && financial_health.is_none()
        {
            return Err(ScanError::ProviderError(format!(
                "{symbol}: all data sources failed"
            )));
        }

        Ok(AggregatedMarketData {
            market_data,
            trend_analysis,
            options,
            dividend_info,
            financial_health,
        })
    }
}

fn log_and_discard<T>(result: Result<T, ScanError>, symbol: &Symbol, what: &str) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(%symbol, error = %e, "{what} failed, proceeding with none");
            None
        }
    }
}

fn financial_health_from_row(row: &scan_core::StockData) -> Option<FinancialHealthMetrics> {
    Some(FinancialHealthMetrics {
        piotroski_f_score: row.piotroski_f_score?,
        altman_z_score: row.altman_z_score?,
        debt_to_equity: row.debt_to_equity?,
        current_ratio: row.current_ratio?,
    })
}

#[async_trait]
impl MarketAggregator for DefaultMarketAggregator {
    async fn aggregate(&self, symbol: &Symbol) -> Result<AggregatedMarketData, ScanError> {
        if let Some(cached) = self.cached(symbol) {
            return Ok(cached);
        }

        let data = tokio::time::timeout(self.timeout, self.fetch(symbol))
            .await
            .map_err(|_| ScanError::ProviderError(format!("{symbol}: aggregation timed out")))??;

        self.cache.insert(
            symbol.clone(),
            CacheEntry {
                data: data.clone(),
                cached_at: Utc::now(),
            },
        );

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use scan_core::{DividendInfo, MarketData, OptionContract, TrendAnalysis, TrendDirection};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeMarket {
        market_ok: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MarketDataProvider for FakeMarket {
        async fn get_market_data(&self, _symbol: &Symbol) -> Result<Option<MarketData>, ScanError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.market_ok {
                Ok(Some(MarketData {
                    current_price: 100.0,
                    volume: 1_000_000,
                    as_of: Utc::now(),
                }))
            } else {
                Err(ScanError::ProviderError("down".into()))
            }
        }

        async fn analyse_trend(
            &self,
            _symbol: &Symbol,
            _days: i64,
        ) -> Result<TrendAnalysis, ScanError> {
            if self.market_ok {
                Ok(TrendAnalysis {
                    direction: TrendDirection::Up,
                    confidence: 0.8,
                    trend_strength: 0.6,
                    expected_growth_percent: 3.0,
                })
            } else {
                Err(ScanError::ProviderError("down".into()))
            }
        }

        async fn get_dividends(&self, _symbol: &Symbol) -> Result<Vec<DividendInfo>, ScanError> {
            if self.market_ok {
                Ok(vec![DividendInfo {
                    ex_dividend_date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
                    cash_amount: 0.5,
                }])
            } else {
                Err(ScanError::ProviderError("down".into()))
            }
        }
    }

    struct FakeOptions {
        ok: bool,
    }

    #[async_trait]
    impl OptionsDataProvider for FakeOptions {
        async fn get_short_term_put_options(
            &self,
            _symbol: &Symbol,
            _min_days: i64,
            _max_days: i64,
        ) -> Result<Vec<OptionContract>, ScanError> {
            if self.ok {
                Ok(vec![OptionContract {
                    strike: 95.0,
                    expiry: NaiveDate::from_ymd_opt(2026, 8, 15).unwrap(),
                    days_to_expiry: 17,
                    premium: 1.5,
                    implied_volatility: 0.35,
                    open_interest: 500,
                    volume: 50,
                }])
            } else {
                Err(ScanError::ProviderError("down".into()))
            }
        }
    }

    async fn empty_store() -> StockDataStore {
        StockDataStore::connect("sqlite::memory:").await.unwrap()
    }

    fn symbol() -> Symbol {
        Symbol::new("AAPL").unwrap()
    }

    #[tokio::test]
    async fn merges_all_sources_when_everything_succeeds() {
        let store = empty_store().await;
        let agg = DefaultMarketAggregator::new(
            Arc::new(FakeMarket {
                market_ok: true,
                calls: AtomicUsize::new(0),
            }),
            Arc::new(FakeOptions { ok: true }),
            Arc::new(store),
            14,
            21,
        );

        let result = agg.aggregate(&symbol()).await.unwrap();
        assert!(result.market_data.is_some());
        assert!(result.trend_analysis.is_some());
        assert_eq!(result.options.len(), 1);
        assert!(result.dividend_info.is_some());
    }

    #[tokio::test]
    async fn succeeds_with_partial_data_when_options_fail() {
        let store = empty_store().await;
        let agg = DefaultMarketAggregator::new(
            Arc::new(FakeMarket {
                market_ok: true,
                calls: AtomicUsize::new(0),
            }),
            Arc::new(FakeOptions { ok: false }),
            Arc::new(store),
            14,
            21,
        );

        let result = agg.aggregate(&symbol()).await.unwrap();
        assert!(result.market_data.is_some());
        assert!(result.options.is_empty());
    }

    #[tokio::test]
    async fn fails_only_when_every_source_fails() {
        let store = empty_store().await;
        let agg = DefaultMarketAggregator::new(
            Arc::new(FakeMarket {
                market_ok: false,
                calls: AtomicUsize::new(0),
            }),
            Arc::new(FakeOptions { ok: false }),
            Arc::new(store),
            14,
            21,
        );

        let err = agg.aggregate(&symbol()).await.unwrap_err();
        assert!(matches!(err, ScanError::ProviderError(_)));
    }

    #[tokio::test]
    async fn second_call_within_ttl_is_served_from_cache() {
        let store = empty_store().await;
        let market = Arc::new(FakeMarket {
            market_ok: true,
            calls: AtomicUsize::new(0),
        });
        let agg = DefaultMarketAggregator::new(
            market.clone(),
            Arc::new(FakeOptions { ok: true }),
            Arc::new(store),
            14,
            21,
        );

        agg.aggregate(&symbol()).await.unwrap();
        agg.aggregate(&symbol()).await.unwrap();

        assert_eq!(market.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fundamentals_layer_is_read_from_the_store() {
        let store = empty_store().await;
        store
            .upsert_fundamentals_layer(
                &symbol(),
                &scan_core::Fundamentals {
                    report_date: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
                    piotroski_f_score: 7,
                    altman_z_score: 3.2,
                    roa: 0.1,
                    debt_to_equity: 0.4,
                    current_ratio: 1.8,
                    market_cap_billions: 50.0,
                    total_assets: 1.0e9,
                    total_liabilities: 4.0e8,
                    total_equity: 6.0e8,
                    revenue: 2.0e8,
                    net_income: 3.0e7,
                    operating_cash_flow: 4.0e7,
                    shares_outstanding: 1.0e8,
                },
            )
            .await
            .unwrap();

        let agg = DefaultMarketAggregator::new(
            Arc::new(FakeMarket {
                market_ok: false,
                calls: AtomicUsize::new(0),
            }),
            Arc::new(FakeOptions { ok: false }),
            Arc::new(store),
            14,
            21,
        );

        let result = agg.aggregate(&symbol()).await.unwrap();
        let health = result.financial_health.unwrap();
        assert_eq!(health.piotroski_f_score, 7);
        assert!((health.altman_z_score - 3.2).abs() < 1e-9);
    }
}
