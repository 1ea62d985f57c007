use scan_core::{AggregatedMarketData, OptionContract, Recommendation, Strategy, Symbol, TrendDirection};

/// Sells PUTs against a stock in a confirmed uptrend ahead of its next
/// ex-dividend date (spec §4.2 `DividendMomentum`). Wider expiry window
/// than `ShortTermPut` since straddling an ex-dividend date often needs
/// more room than a strict 14-21 day band allows.
pub struct DividendMomentum {
    min_expiry_days: i64,
    max_expiry_days: i64,
}

impl Default for DividendMomentum {
    fn default() -> Self {
        Self {
            min_expiry_days: 7,
            max_expiry_days: 45,
        }
    }
}

impl DividendMomentum {
    pub fn new(min_expiry_days: i64, max_expiry_days: i64) -> Self {
        Self {
            min_expiry_days,
            max_expiry_days,
        }
    }
}

impl Strategy for DividendMomentum {
    fn name(&self) -> &'static str {
        "DividendMomentum"
    }

    fn description(&self) -> &'static str {
        "OTM PUTs on uptrending dividend payers, favouring expiries that straddle the next ex-dividend date"
    }

    fn target_expiry_min_days(&self) -> i64 {
        self.min_expiry_days
    }

    fn target_expiry_max_days(&self) -> i64 {
        self.max_expiry_days
    }

    fn evaluate(&self, symbol: &Symbol, data: &AggregatedMarketData) -> Vec<Recommendation> {
        let market = match data.market_data {
            Some(m) => m,
            None => return Vec::new(),
        };
        let trend = match data.trend_analysis {
            Some(t) if t.direction == TrendDirection::Up => t,
            _ => return Vec::new(),
        };
        let dividend = match data.dividend_info {
            Some(d) => d,
            None => return Vec::new(),
        };
        if data.options.is_empty() {
            return Vec::new();
        }

        let today = market.as_of.date_naive();

        let mut scored: Vec<(f64, OptionContract)> = data
            .options
            .iter()
            .filter(|o| o.strike < market.current_price)
            .filter(|o| o.premium >= 0.10)
            .filter(|o| o.days_to_expiry >= self.min_expiry_days && o.days_to_expiry <= self.max_expiry_days)
            .filter_map(|o| {
                let otm_distance = (market.current_price - o.strike) / market.current_price;
                if otm_distance <= 0.0 {
                    return None;
                }
                let straddles_ex_div = today <= dividend.ex_dividend_date && o.expiry >= dividend.ex_dividend_date;
                let straddle_bonus = if straddles_ex_div { 0.25 } else { 0.0 };
                let otm_component = (otm_distance / 0.15).clamp(0.0, 1.0);
                let liquidity = crate::scoring::liquidity_score(o.open_interest, o.volume);

                let score = trend.confidence * 0.35
                    + trend.trend_strength * 0.15
                    + otm_component * 0.15
                    + liquidity * 0.10
                    + straddle_bonus;
                Some((score.clamp(0.0, 1.0), *o))
            })
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(3);

        scored
            .into_iter()
            .map(|(score, option)| Recommendation {
                symbol: symbol.clone(),
                strategy_name: self.name().to_string(),
                current_price: market.current_price,
                strike_price: option.strike,
                expiry: option.expiry,
                days_to_expiry: option.days_to_expiry,
                premium: option.premium,
                breakeven: option.strike - option.premium,
                confidence: score,
                expected_growth_percent: trend.expected_growth_percent,
            })
            .collect()
    }
}
