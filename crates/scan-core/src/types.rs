use crate::Symbol;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Trend direction as reported by `MarketDataProvider::analyse_trend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Up,
    Down,
    Sideways,
}

/// Output of `MarketDataProvider::analyse_trend` (spec §6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub direction: TrendDirection,
    /// Confidence in the trend call, 0.0..=1.0.
    pub confidence: f64,
    /// Magnitude of the trend, 0.0..=1.0.
    pub trend_strength: f64,
    pub expected_growth_percent: f64,
}

/// Latest price/volume snapshot for a symbol (spec §6 `MarketData`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarketData {
    pub current_price: f64,
    pub volume: i64,
    pub as_of: DateTime<Utc>,
}

/// One option contract in a short-term PUT chain (spec §6 `OptionContract`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OptionContract {
    pub strike: f64,
    pub expiry: NaiveDate,
    pub days_to_expiry: i64,
    pub premium: f64,
    pub implied_volatility: f64,
    pub open_interest: i64,
    pub volume: i64,
}

/// Dividend history entry used by `DividendMomentum` (spec §4.2).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DividendInfo {
    pub ex_dividend_date: NaiveDate,
    pub cash_amount: f64,
}

/// Per-symbol fundamentals payload, as read from `FundamentalsProvider`
/// (spec §3, fundamentals layer fields).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Fundamentals {
    pub report_date: NaiveDate,
    pub piotroski_f_score: u8,
    pub altman_z_score: f64,
    pub roa: f64,
    pub debt_to_equity: f64,
    pub current_ratio: f64,
    pub market_cap_billions: f64,
    pub total_assets: f64,
    pub total_liabilities: f64,
    pub total_equity: f64,
    pub revenue: f64,
    pub net_income: f64,
    pub operating_cash_flow: f64,
    pub shares_outstanding: f64,
}

/// Derived view of the fundamentals layer that strategies read (spec §3
/// `financialHealthMetrics`). Kept distinct from [`Fundamentals`] so
/// strategies never depend on the provider wire format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FinancialHealthMetrics {
    pub piotroski_f_score: u8,
    pub altman_z_score: f64,
    pub debt_to_equity: f64,
    pub current_ratio: f64,
}

impl From<&Fundamentals> for FinancialHealthMetrics {
    fn from(f: &Fundamentals) -> Self {
        Self {
            piotroski_f_score: f.piotroski_f_score,
            altman_z_score: f.altman_z_score,
            debt_to_equity: f.debt_to_equity,
            current_ratio: f.current_ratio,
        }
    }
}

/// In-memory, per-symbol-per-scan bundle handed to every [`crate::Strategy`]
/// (spec §3 `AggregatedMarketData`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatedMarketData {
    pub market_data: Option<MarketData>,
    pub trend_analysis: Option<TrendAnalysis>,
    pub options: Vec<OptionContract>,
    pub dividend_info: Option<DividendInfo>,
    pub financial_health: Option<FinancialHealthMetrics>,
}

/// Strategy output (spec §3 `Recommendation`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub symbol: Symbol,
    pub strategy_name: String,
    pub current_price: f64,
    pub strike_price: f64,
    pub expiry: NaiveDate,
    pub days_to_expiry: i64,
    pub premium: f64,
    pub breakeven: f64,
    pub confidence: f64,
    pub expected_growth_percent: f64,
}

/// Persisted, single-record-per-symbol row (spec §3 `StockData`).
///
/// Fields group into an identity pair, a fundamentals layer (written by
/// [`crate::FundamentalsProvider`]), and a market/options layer (written by
/// the options/market feed). See `stock-data-store` for the merge
/// semantics that keep the two layers from clobbering each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockData {
    pub symbol: Symbol,
    pub modification_time: DateTime<Utc>,

    // Fundamentals layer.
    pub report_date: Option<NaiveDate>,
    pub piotroski_f_score: Option<u8>,
    pub altman_z_score: Option<f64>,
    pub roa: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub current_ratio: Option<f64>,
    pub market_cap_billions: Option<f64>,
    pub total_assets: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub total_equity: Option<f64>,
    pub revenue: Option<f64>,
    pub net_income: Option<f64>,
    pub operating_cash_flow: Option<f64>,
    pub shares_outstanding: Option<f64>,
    pub fundamentals_updated_at: Option<DateTime<Utc>>,

    // Market/options layer.
    pub current_price: Option<f64>,
    pub strike_price: Option<f64>,
    pub expiry: Option<NaiveDate>,
    pub days_to_expiry: Option<i64>,
    pub premium: Option<f64>,
    pub breakeven: Option<f64>,
    pub confidence: Option<f64>,
    pub expected_growth_percent: Option<f64>,
    pub strategy_name: Option<String>,
    pub exchange_symbol: Option<String>,
    pub option_price: Option<f64>,
    pub volume: Option<i64>,
    pub open_interest: Option<i64>,
    pub market_updated_at: Option<DateTime<Utc>>,
}

impl StockData {
    /// A freshly-created row for `symbol` with every layer field empty.
    pub fn empty(symbol: Symbol, now: DateTime<Utc>) -> Self {
        Self {
            symbol,
            modification_time: now,
            report_date: None,
            piotroski_f_score: None,
            altman_z_score: None,
            roa: None,
            debt_to_equity: None,
            current_ratio: None,
            market_cap_billions: None,
            total_assets: None,
            total_liabilities: None,
            total_equity: None,
            revenue: None,
            net_income: None,
            operating_cash_flow: None,
            shares_outstanding: None,
            fundamentals_updated_at: None,
            current_price: None,
            strike_price: None,
            expiry: None,
            days_to_expiry: None,
            premium: None,
            breakeven: None,
            confidence: None,
            expected_growth_percent: None,
            strategy_name: None,
            exchange_symbol: None,
            option_price: None,
            volume: None,
            open_interest: None,
            market_updated_at: None,
        }
    }
}

/// Scan run status (spec §3 `ScanLog.status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ScanStatus {
    Running,
    Succeeded,
    Failed,
}

/// Append-only scan attempt record (spec §3 `ScanLog`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanLog {
    pub id: uuid::Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub symbols_scanned: i64,
    pub recommendations_generated: i64,
    pub status: ScanStatus,
    pub error_message: Option<String>,
}

impl ScanLog {
    pub fn open(now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            started_at: now,
            completed_at: None,
            symbols_scanned: 0,
            recommendations_generated: 0,
            status: ScanStatus::Running,
            error_message: None,
        }
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|end| end - self.started_at)
    }
}

/// Point-in-time snapshot of the process-wide scan state (spec §2 C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanStateSnapshot {
    pub in_progress: bool,
    pub scan_id: Option<uuid::Uuid>,
    pub total: usize,
    pub scanned: usize,
    pub current_symbol: Option<Symbol>,
    pub started_at: Option<DateTime<Utc>>,
}

impl Default for ScanStateSnapshot {
    fn default() -> Self {
        Self {
            in_progress: false,
            scan_id: None,
            total: 0,
            scanned: 0,
            current_symbol: None,
            started_at: None,
        }
    }
}

/// Per-symbol metrics attached to `SymbolScanning`/`SymbolCompleted`/`SymbolError`
/// events when fundamentals are available (spec §6 wire shape).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScanEventMetrics {
    pub piotroski_f_score: Option<u8>,
    pub altman_z_score: Option<f64>,
}

/// Transport-agnostic progress event (spec §3 `ScanEvent`, §6 wire shapes).
///
/// `eventType` carries the discriminant the spec calls `status` on the
/// per-symbol events; it is named `eventType` here instead so it never
/// collides with `ScanCompleted`'s own `status` field (the terminal
/// `ScanLog` status, a different axis entirely).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "eventType")]
pub enum ScanEvent {
    ScanStarted {
        scan_log_id: uuid::Uuid,
        total_symbols: usize,
        /// Populated only for a synthetic replay event emitted to a
        /// late-joining subscriber (spec §4.4); `None` for the live event.
        scanned_count: Option<usize>,
        current_symbol: Option<Symbol>,
        timestamp: DateTime<Utc>,
    },
    SymbolScanning {
        symbol: Symbol,
        current_index: usize,
        total_symbols: usize,
        progress_percent: f64,
        timestamp: DateTime<Utc>,
    },
    SymbolCompleted {
        symbol: Symbol,
        current_index: usize,
        total_symbols: usize,
        progress_percent: f64,
        recommendations_count: usize,
        metrics: Option<ScanEventMetrics>,
        timestamp: DateTime<Utc>,
    },
    SymbolError {
        symbol: Symbol,
        current_index: usize,
        total_symbols: usize,
        progress_percent: f64,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
    ScanCompleted {
        id: uuid::Uuid,
        started_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
        symbols_scanned: i64,
        recommendations_generated: i64,
        status: ScanStatus,
        error_message: Option<String>,
        duration_ms: Option<i64>,
    },
}

/// `(current_index + 1) / total * 100`, clamped to `[0, 100]`; `0.0` when
/// `total` is zero.
pub fn progress_percent(current_index: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (((current_index + 1) as f64 / total as f64) * 100.0).clamp(0.0, 100.0)
}

impl ScanEvent {
    pub fn from_scan_log(log: &ScanLog) -> Self {
        ScanEvent::ScanCompleted {
            id: log.id,
            started_at: log.started_at,
            completed_at: log.completed_at,
            symbols_scanned: log.symbols_scanned,
            recommendations_generated: log.recommendations_generated,
            status: log.status,
            error_message: log.error_message.clone(),
            duration_ms: log.duration().map(|d| d.num_milliseconds()),
        }
    }
}
