use scan_core::{AggregatedMarketData, OptionContract, Recommendation, Strategy, Symbol, TrendDirection};

const MIN_QUALIFYING_IV: f64 = 0.25;
const MAX_SELECTABLE_IV: f64 = 0.60;
const OTM_BAND: std::ops::RangeInclusive<f64> = 0.05..=0.12;
const IV_BAND: std::ops::RangeInclusive<f64> = 0.30..=0.50;
const MIN_QUALIFYING_PREMIUM: f64 = 1.0;

/// Sells into an expected post-event IV collapse (spec §4.2
/// `VolatilityCrush`): requires some elevated IV in the chain to begin
/// with, avoids chains so hot they're probably already event-priced
/// (IV above 60%), and targets the 5-12% OTM / 30-50% IV sweet spot.
pub struct VolatilityCrush {
    min_expiry_days: i64,
    max_expiry_days: i64,
}

impl Default for VolatilityCrush {
    fn default() -> Self {
        Self {
            min_expiry_days: 14,
            max_expiry_days: 21,
        }
    }
}

impl VolatilityCrush {
    pub fn new(min_expiry_days: i64, max_expiry_days: i64) -> Self {
        Self {
            min_expiry_days,
            max_expiry_days,
        }
    }
}

impl Strategy for VolatilityCrush {
    fn name(&self) -> &'static str {
        "VolatilityCrush"
    }

    fn description(&self) -> &'static str {
        "OTM PUTs in the 5-12% band sold against elevated-but-not-extreme implied volatility"
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

        if let Some(trend) = data.trend_analysis {
            if trend.direction == TrendDirection::Down && trend.trend_strength >= 0.75 {
                return Vec::new();
            }
        }

        if data.options.is_empty() {
            return Vec::new();
        }

        if data.options.iter().all(|o| o.implied_volatility < MIN_QUALIFYING_IV) {
            return Vec::new();
        }

        let expected_growth_percent = data
            .trend_analysis
            .map(|t| t.expected_growth_percent)
            .unwrap_or(0.0);

        let mut scored: Vec<(f64, OptionContract)> = data
            .options
            .iter()
            .filter(|o| o.strike < market.current_price)
            .filter(|o| o.implied_volatility <= MAX_SELECTABLE_IV)
            .filter(|o| o.days_to_expiry >= self.min_expiry_days && o.days_to_expiry <= self.max_expiry_days)
            .filter_map(|o| {
                let otm_distance = (market.current_price - o.strike) / market.current_price;
                if !OTM_BAND.contains(&otm_distance) || !IV_BAND.contains(&o.implied_volatility) {
                    return None;
                }
                if o.premium <= MIN_QUALIFYING_PREMIUM {
                    return None;
                }

                let otm_fit = 1.0 - (otm_distance - 0.085).abs() / 0.035;
                let iv_fit = 1.0 - (o.implied_volatility - 0.40).abs() / 0.10;
                let liquidity = crate::scoring::liquidity_score(o.open_interest, o.volume);
                let score = otm_fit.clamp(0.0, 1.0) * 0.45 + iv_fit.clamp(0.0, 1.0) * 0.40 + liquidity * 0.15;
                Some((score.clamp(0.0, 1.0), *o))
            })
            .collect();

        if scored.is_empty() {
            return Vec::new();
        }

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
                expected_growth_percent,
            })
            .collect()
    }
}
