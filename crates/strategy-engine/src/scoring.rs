/// Normalize open interest + volume into a `[0, 1]` liquidity component
/// shared by every strategy's scoring blend. Saturates at generous
/// thresholds so an already-liquid contract doesn't keep dominating the
/// score once it's clearly tradeable.
pub fn liquidity_score(open_interest: i64, volume: i64) -> f64 {
    let oi_component = (open_interest as f64 / 1_000.0).clamp(0.0, 1.0);
    let volume_component = (volume as f64 / 500.0).clamp(0.0, 1.0);
    (oi_component * 0.6 + volume_component * 0.4).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn saturates_at_one() {
        assert_eq!(liquidity_score(10_000, 10_000), 1.0);
    }

    #[test]
    fn zero_liquidity_scores_zero() {
        assert_eq!(liquidity_score(0, 0), 0.0);
    }

    #[test]
    fn blends_open_interest_and_volume_by_weight() {
        // 500 OI alone -> 0.5 * 0.6; 250 volume alone -> 0.5 * 0.4.
        assert_relative_eq!(liquidity_score(500, 250), 0.5, epsilon = 1e-9);
    }
}
