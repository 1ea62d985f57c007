use chrono::NaiveDate;

/// The market/options layer fields written by [`crate::StockDataStore::upsert_market_layer`]
/// (spec §3 "Market/options layer", §4.3 "Merge semantics"). Built by the
/// orchestrator from a `Recommendation` plus the `OptionContract` it was
/// derived from.
#[derive(Debug, Clone)]
pub struct MarketLayerUpdate {
    pub current_price: f64,
    pub strike_price: f64,
    pub expiry: NaiveDate,
    pub days_to_expiry: i64,
    pub premium: f64,
    pub breakeven: f64,
    pub confidence: f64,
    pub expected_growth_percent: f64,
    pub strategy_name: String,
    pub exchange_symbol: Option<String>,
    pub option_price: f64,
    pub volume: i64,
    pub open_interest: i64,
}
