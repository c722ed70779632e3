use rust_decimal::Decimal;

use super::types::TrailParameters;
use crate::core::{Result, TrailingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailDecision {
    pub trail: bool,
    /// `market * (1 - buffer)`, before tick rounding.
    pub candidate_price: Decimal,
    /// Market price needed before trailing is considered.
    pub margin_threshold: Decimal,
}

pub fn candidate_price(market_price: Decimal, params: &TrailParameters) -> Decimal {
    market_price * (Decimal::ONE - params.buffer())
}

/// Decide whether the resting sell order should move up.
///
/// Trails only when the market has cleared `current * (1 + step)` AND the
/// discounted market price beats the current sell price. The first guard
/// keeps noise from churning the order; the second means it never moves down.
pub fn decide(
    current_sell_price: Decimal,
    market_price: Decimal,
    params: &TrailParameters,
) -> Result<TrailDecision> {
    if current_sell_price <= Decimal::ZERO {
        return Err(TrailingError::Configuration(format!(
            "recorded sell price must be positive, got {}",
            current_sell_price
        )));
    }
    if market_price <= Decimal::ZERO {
        return Err(TrailingError::Configuration(format!(
            "market price must be positive, got {}",
            market_price
        )));
    }

    let margin_threshold = current_sell_price * (Decimal::ONE + params.step_threshold());
    let candidate_price = candidate_price(market_price, params);
    let trail = market_price >= margin_threshold && candidate_price > current_sell_price;

    Ok(TrailDecision {
        trail,
        candidate_price,
        margin_threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn params() -> TrailParameters {
        TrailParameters::new(dec!(0.005), dec!(0.003)).unwrap()
    }

    #[test]
    fn test_trails_on_clear_rise() {
        let decision = decide(dec!(100), dec!(102), &params()).unwrap();
        assert!(decision.trail);
        assert_eq!(decision.candidate_price, dec!(101.694));
        assert_eq!(decision.margin_threshold, dec!(100.5));
    }

    #[test]
    fn test_exactly_at_threshold_trails() {
        let decision = decide(dec!(100), dec!(100.5), &params()).unwrap();
        assert_eq!(decision.candidate_price, dec!(100.1985));
        assert!(decision.trail);
    }

    #[test]
    fn test_just_below_threshold_holds() {
        let decision = decide(dec!(100), dec!(100.49), &params()).unwrap();
        assert!(!decision.trail);
    }

    #[test]
    fn test_threshold_alone_is_not_enough() {
        // At the threshold, but the buffer drags the candidate below the current price
        let wide_buffer = TrailParameters::new(dec!(0.005), dec!(0.01)).unwrap();
        let decision = decide(dec!(100), dec!(100.5), &wide_buffer).unwrap();
        assert_eq!(decision.candidate_price, dec!(99.495));
        assert!(!decision.trail);
    }

    #[test]
    fn test_falling_market_never_trails() {
        let decision = decide(dec!(100), dec!(95), &params()).unwrap();
        assert!(!decision.trail);
    }

    #[test]
    fn test_invalid_inputs_fail_fast() {
        assert!(matches!(
            decide(Decimal::ZERO, dec!(100), &params()),
            Err(TrailingError::Configuration(_))
        ));
        assert!(decide(dec!(-1), dec!(100), &params()).is_err());
        assert!(decide(dec!(100), Decimal::ZERO, &params()).is_err());
    }

    #[test]
    fn test_trail_implies_strictly_higher_candidate() {
        let grids = [
            TrailParameters::new(dec!(0), dec!(0)).unwrap(),
            TrailParameters::new(dec!(0.005), dec!(0.003)).unwrap(),
            TrailParameters::new(dec!(0.001), dec!(0.02)).unwrap(),
            TrailParameters::new(dec!(0.05), dec!(0.5)).unwrap(),
        ];
        for params in grids {
            let mut market = dec!(90);
            while market < dec!(120) {
                let decision = decide(dec!(100), market, &params).unwrap();
                if decision.trail {
                    assert!(decision.candidate_price > dec!(100));
                    assert!(market >= decision.margin_threshold);
                }
                market += dec!(0.25);
            }
        }
    }
}
