use chrono::Utc;
use scan_core::{AggregatedMarketData, OptionContract, Recommendation, Strategy, Symbol, TrendDirection};

/// Cash-secured PUT screen over the near-dated chain (spec §4.2
/// `ShortTermPut`, `14..21` days). A pure scoring blend of trend
/// confidence/strength, OTM distance, and chain liquidity — the spec
/// fixes the qualifying/exclusion conditions and bounds, not this blend
/// (spec §9 Open Questions).
pub struct ShortTermPut {
    min_expiry_days: i64,
    max_expiry_days: i64,
}

impl Default for ShortTermPut {
    fn default() -> Self {
        Self {
            min_expiry_days: 14,
            max_expiry_days: 21,
        }
    }
}

impl ShortTermPut {
    pub fn new(min_expiry_days: i64, max_expiry_days: i64) -> Self {
        Self {
            min_expiry_days,
            max_expiry_days,
        }
    }
}

impl Strategy for ShortTermPut {
    fn name(&self) -> &'static str {
        "ShortTermPut"
    }

    fn description(&self) -> &'static str {
        "Near-dated OTM cash-secured PUTs sized off trend confidence and chain liquidity"
    }

    fn target_expiry_min_days(&self) -> i64 {
        self.min_expiry_days
    }

    fn target_expiry_max_days(&self) -> i64 {
        self.max_expiry_days
    }

    fn evaluate(&self, symbol: &Symbol, data: &AggregatedMarketData) -> Vec<Recommendation> {
        let (market, trend) = match (data.market_data, data.trend_analysis) {
            (Some(m), Some(t)) => (m, t),
            _ => return Vec::new(),
        };

        if data.options.is_empty() || trend.direction == TrendDirection::Down {
            return Vec::new();
        }

        let mut scored: Vec<(f64, OptionContract)> = data
            .options
            .iter()
            .filter(|o| o.strike < market.current_price)
            .filter(|o| o.premium >= 0.10)
            .filter(|o| o.days_to_expiry >= self.min_expiry_days && o.days_to_expiry <= self.max_expiry_days)
            .filter_map(|o| {
                let otm_distance = (market.current_price - o.strike) / market.current_price;
                let liquidity = crate::scoring::liquidity_score(o.open_interest, o.volume);
                let otm_component = (otm_distance / 0.30).clamp(0.0, 1.0);
                let score = trend.confidence * 0.40
                    + trend.trend_strength * 0.20
                    + otm_component * 0.25
                    + liquidity * 0.15;
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

#[cfg(test)]
mod tests {
    use super::*;
    use scan_core::{FinancialHealthMetrics, MarketData, TrendAnalysis};

    fn market(price: f64) -> MarketData {
        MarketData {
            current_price: price,
            volume: 1_000_000,
            as_of: Utc::now(),
        }
    }

    fn trend(direction: TrendDirection, confidence: f64, strength: f64, growth: f64) -> TrendAnalysis {
        TrendAnalysis {
            direction,
            confidence,
            trend_strength: strength,
            expected_growth_percent: growth,
        }
    }

    fn option(strike: f64, days: i64, premium: f64) -> OptionContract {
        OptionContract {
            strike,
            expiry: Utc::now().date_naive() + chrono::Duration::days(days),
            days_to_expiry: days,
            premium,
            implied_volatility: 0.30,
            open_interest: 500,
            volume: 100,
        }
    }

    fn data(market_price: f64, t: TrendAnalysis, options: Vec<OptionContract>) -> AggregatedMarketData {
        AggregatedMarketData {
            market_data: Some(market(market_price)),
            trend_analysis: Some(t),
            options,
            dividend_info: None,
            financial_health: Some(FinancialHealthMetrics {
                piotroski_f_score: 8,
                altman_z_score: 3.5,
                debt_to_equity: 0.4,
                current_ratio: 2.0,
            }),
        }
    }

    #[test]
    fn down_trend_yields_no_recommendations() {
        let strategy = ShortTermPut::default();
        let d = data(
            100.0,
            trend(TrendDirection::Down, 0.8, 0.8, -5.0),
            vec![option(95.0, 18, 1.5)],
        );
        assert!(strategy.evaluate(&Symbol::new("AAA").unwrap(), &d).is_empty());
    }

    #[test]
    fn missing_trend_or_market_data_yields_empty() {
        let strategy = ShortTermPut::default();
        let mut d = data(100.0, trend(TrendDirection::Up, 0.7, 0.5, 3.0), vec![option(95.0, 18, 1.5)]);
        d.market_data = None;
        assert!(strategy.evaluate(&Symbol::new("AAA").unwrap(), &d).is_empty());
    }

    #[test]
    fn qualifying_options_are_otm_and_within_window() {
        let strategy = ShortTermPut::default();
        let d = data(
            100.0,
            trend(TrendDirection::Up, 0.8, 0.6, 4.0),
            vec![option(95.0, 18, 1.5), option(105.0, 18, 1.5), option(90.0, 10, 1.0)],
        );
        let recs = strategy.evaluate(&Symbol::new("AAA").unwrap(), &d);
        assert_eq!(recs.len(), 1);
        let rec = &recs[0];
        assert!(rec.strike_price < rec.current_price);
        assert_eq!(rec.breakeven, rec.strike_price - rec.premium);
        assert!(rec.days_to_expiry >= 14 && rec.days_to_expiry <= 21);
    }

    #[test]
    fn truncates_to_top_three_by_score() {
        let strategy = ShortTermPut::default();
        let options = vec![
            option(80.0, 14, 2.0),
            option(85.0, 15, 1.8),
            option(90.0, 16, 1.5),
            option(95.0, 17, 1.0),
        ];
        let d = data(100.0, trend(TrendDirection::Up, 0.9, 0.9, 5.0), options);
        let recs = strategy.evaluate(&Symbol::new("AAA").unwrap(), &d);
        assert!(recs.len() <= 3);
    }

    #[test]
    fn deterministic_across_repeated_calls() {
        let strategy = ShortTermPut::default();
        let d = data(
            100.0,
            trend(TrendDirection::Up, 0.8, 0.6, 4.0),
            vec![option(95.0, 18, 1.5), option(90.0, 19, 2.0)],
        );
        let symbol = Symbol::new("AAA").unwrap();
        let first = strategy.evaluate(&symbol, &d);
        let second = strategy.evaluate(&symbol, &d);
        assert_eq!(
            first.iter().map(|r| r.confidence).collect::<Vec<_>>(),
            second.iter().map(|r| r.confidence).collect::<Vec<_>>()
        );
    }
}
