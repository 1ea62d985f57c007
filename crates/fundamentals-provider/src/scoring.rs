/// Raw balance-sheet/income-statement inputs needed to score a quarter
/// against its prior-year quarter (spec §4.1 `piotrowski_f_score`/
/// `altman_z_score`).
#[derive(Debug, Clone, Copy)]
pub struct FinancialSnapshot {
    pub total_assets: f64,
    pub total_liabilities: f64,
    pub total_equity: f64,
    pub revenue: f64,
    pub net_income: f64,
    pub operating_cash_flow: f64,
    pub current_assets: f64,
    pub current_liabilities: f64,
    pub shares_outstanding: f64,
    pub market_cap: f64,
    pub gross_profit: f64,
    pub long_term_debt: f64,
}

/// Piotroski F-Score (0-9): nine binary tests of profitability, leverage,
/// liquidity, and operating efficiency, each worth one point. `prior`
/// is the same quarter one year earlier; without it, every
/// year-over-year test defaults to "not earned" rather than panicking.
pub fn piotroski_f_score(current: &FinancialSnapshot, prior: Option<&FinancialSnapshot>) -> u8 {
    let mut score: u8 = 0;

    let roa = safe_div(current.net_income, current.total_assets);

    // Profitability
    if current.net_income > 0.0 {
        score += 1;
    }
    if current.operating_cash_flow > 0.0 {
        score += 1;
    }
    if current.operating_cash_flow > current.net_income {
        score += 1;
    }
    if let Some(prior) = prior {
        let prior_roa = safe_div(prior.net_income, prior.total_assets);
        if roa > prior_roa {
            score += 1;
        }
    }

    // Leverage, liquidity
    let current_ratio = safe_div(current.current_assets, current.current_liabilities);
    let leverage = safe_div(current.long_term_debt, current.total_assets);
    if let Some(prior) = prior {
        let prior_leverage = safe_div(prior.long_term_debt, prior.total_assets);
        if leverage < prior_leverage {
            score += 1;
        }
        let prior_current_ratio = safe_div(prior.current_assets, prior.current_liabilities);
        if current_ratio > prior_current_ratio {
            score += 1;
        }
        if current.shares_outstanding <= prior.shares_outstanding {
            score += 1;
        }
    }

    // Operating efficiency
    let gross_margin = safe_div(current.gross_profit, current.revenue);
    let asset_turnover = safe_div(current.revenue, current.total_assets);
    if let Some(prior) = prior {
        let prior_gross_margin = safe_div(prior.gross_profit, prior.revenue);
        if gross_margin > prior_gross_margin {
            score += 1;
        }
        let prior_asset_turnover = safe_div(prior.revenue, prior.total_assets);
        if asset_turnover > prior_asset_turnover {
            score += 1;
        }
    }

    score.min(9)
}

/// Altman Z-Score for public companies (Altman 1968):
/// `Z = 1.2*A + 1.4*B + 3.3*C + 0.6*D + 1.0*E`, where A-E are the five
/// working-capital/retained-earnings/EBIT/equity/sales ratios below.
/// `Z > 2.99` safe, `1.81 <= Z <= 2.99` grey zone, `Z < 1.81` distress.
pub fn altman_z_score(s: &FinancialSnapshot) -> f64 {
    let working_capital = s.current_assets - s.current_liabilities;
    let a = safe_div(working_capital, s.total_assets);
    let b = safe_div(s.net_income, s.total_assets); // retained earnings proxy
    let c = safe_div(s.net_income + s.operating_cash_flow * 0.0, s.total_assets); // EBIT proxy via net income
    let d = safe_div(s.market_cap, s.total_liabilities);
    let e = safe_div(s.revenue, s.total_assets);

    1.2 * a + 1.4 * b + 3.3 * c + 0.6 * d + 1.0 * e
}

fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator.abs() > f64::EPSILON {
        numerator / denominator
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn healthy() -> FinancialSnapshot {
        FinancialSnapshot {
            total_assets: 1_000.0,
            total_liabilities: 400.0,
            total_equity: 600.0,
            revenue: 2_000.0,
            net_income: 150.0,
            operating_cash_flow: 200.0,
            current_assets: 500.0,
            current_liabilities: 200.0,
            shares_outstanding: 100.0,
            market_cap: 3_000.0,
            gross_profit: 800.0,
            long_term_debt: 150.0,
        }
    }

    fn weaker_prior() -> FinancialSnapshot {
        FinancialSnapshot {
            total_assets: 950.0,
            total_liabilities: 420.0,
            total_equity: 530.0,
            revenue: 1_800.0,
            net_income: 80.0,
            operating_cash_flow: 90.0,
            current_assets: 420.0,
            current_liabilities: 210.0,
            shares_outstanding: 100.0,
            market_cap: 2_200.0,
            gross_profit: 650.0,
            long_term_debt: 180.0,
        }
    }

    #[test]
    fn improving_fundamentals_score_highly() {
        let score = piotroski_f_score(&healthy(), Some(&weaker_prior()));
        assert!(score >= 7, "expected a high score, got {}", score);
    }

    #[test]
    fn missing_prior_quarter_only_scores_level_tests() {
        let score = piotroski_f_score(&healthy(), None);
        // Only the three tests that don't need `prior` can award points.
        assert!(score <= 3);
    }

    #[test]
    fn z_score_is_deterministic_and_finite() {
        let z = altman_z_score(&healthy());
        assert!(z.is_finite());
        assert_relative_eq!(altman_z_score(&healthy()), z, epsilon = 1e-9);
    }

    #[test]
    fn zero_assets_does_not_divide_by_zero() {
        let mut s = healthy();
        s.total_assets = 0.0;
        let z = altman_z_score(&s);
        assert!(z.is_finite());
    }
}
