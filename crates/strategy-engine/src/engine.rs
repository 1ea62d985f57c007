use scan_core::{AggregatedMarketData, Recommendation, Strategy, StrategyConfig, Symbol};
use std::cmp::Ordering;

use crate::strategies::{DividendMomentum, ShortTermPut, VolatilityCrush};

/// Runs every registered [`Strategy`] against one symbol's aggregated
/// data, filters by `min_confidence`, and sorts/truncates the combined
/// output (spec §4.2 "Engine contract").
pub struct StrategyEngine {
    strategies: Vec<Box<dyn Strategy>>,
    min_confidence: f64,
}

impl StrategyEngine {
    pub fn new(strategies: Vec<Box<dyn Strategy>>, min_confidence: f64) -> Self {
        Self {
            strategies,
            min_confidence,
        }
    }

    /// The three strategies this spec names, wired to `config`'s expiry
    /// bounds. `DividendMomentum` keeps its own wider bounds (it needs
    /// room to straddle an ex-dividend date) rather than inheriting the
    /// narrower `ShortTermPut`/`VolatilityCrush` window.
    pub fn with_default_strategies(config: &StrategyConfig) -> Self {
        let strategies: Vec<Box<dyn Strategy>> = vec![
            Box::new(ShortTermPut::new(config.min_expiry_days, config.max_expiry_days)),
            Box::new(VolatilityCrush::new(config.min_expiry_days, config.max_expiry_days)),
            Box::new(DividendMomentum::default()),
        ];
        Self::new(strategies, config.min_confidence)
    }

    pub fn strategies(&self) -> &[Box<dyn Strategy>] {
        &self.strategies
    }

    /// Apply every strategy, concatenate, drop anything below
    /// `min_confidence`, sort by the deterministic tie-break order (spec
    /// §4.2 "Tie-breaking"), and keep the top 3.
    pub fn evaluate(&self, symbol: &Symbol, data: &AggregatedMarketData) -> Vec<Recommendation> {
        let mut recommendations: Vec<Recommendation> = self
            .strategies
            .iter()
            .flat_map(|strategy| strategy.evaluate(symbol, data))
            .filter(|r| r.confidence >= self.min_confidence)
            .collect();

        recommendations.sort_by(compare_by_tie_break_order);
        recommendations.truncate(3);
        recommendations
    }
}

fn compare_by_tie_break_order(a: &Recommendation, b: &Recommendation) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| b.expected_growth_percent.total_cmp(&a.expected_growth_percent))
        .then_with(|| a.days_to_expiry.cmp(&b.days_to_expiry))
        .then_with(|| a.strategy_name.cmp(&b.strategy_name))
}
