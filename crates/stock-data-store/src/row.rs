use chrono::{DateTime, NaiveDate, Utc};
use scan_core::{ScanError, StockData, Symbol};

/// Raw row shape matching `schema::STOCK_DATA` column-for-column, decoded
/// via `sqlx`'s `chrono` integration (dates/timestamps round-trip as SQLite
/// `TEXT` without manual parsing).
#[derive(Debug, sqlx::FromRow)]
pub struct StockDataRow {
    pub symbol: String,
    pub modification_time: DateTime<Utc>,

    pub report_date: Option<NaiveDate>,
    pub piotroski_f_score: Option<i64>,
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

impl StockDataRow {
    pub fn into_stock_data(self) -> Result<StockData, ScanError> {
        Ok(StockData {
            symbol: Symbol::new(self.symbol)?,
            modification_time: self.modification_time,
            report_date: self.report_date,
            piotroski_f_score: self.piotroski_f_score.map(|v| v as u8),
            altman_z_score: self.altman_z_score,
            roa: self.roa,
            debt_to_equity: self.debt_to_equity,
            current_ratio: self.current_ratio,
            market_cap_billions: self.market_cap_billions,
            total_assets: self.total_assets,
            total_liabilities: self.total_liabilities,
            total_equity: self.total_equity,
            revenue: self.revenue,
            net_income: self.net_income,
            operating_cash_flow: self.operating_cash_flow,
            shares_outstanding: self.shares_outstanding,
            fundamentals_updated_at: self.fundamentals_updated_at,
            current_price: self.current_price,
            strike_price: self.strike_price,
            expiry: self.expiry,
            days_to_expiry: self.days_to_expiry,
            premium: self.premium,
            breakeven: self.breakeven,
            confidence: self.confidence,
            expected_growth_percent: self.expected_growth_percent,
            strategy_name: self.strategy_name,
            exchange_symbol: self.exchange_symbol,
            option_price: self.option_price,
            volume: self.volume,
            open_interest: self.open_interest,
            market_updated_at: self.market_updated_at,
        })
    }
}

pub fn piotroski_as_i64(score: Option<u8>) -> Option<i64> {
    score.map(i64::from)
}
