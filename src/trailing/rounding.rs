use rust_decimal::Decimal;

use crate::core::{Result, TrailingError};

/// Largest multiple of `tick` that is not above `price`.
///
/// Never rounds up: a sell limit above the computed price could sit out of
/// reach of the market or fail the exchange's price filter.
pub fn round_to_tick(price: Decimal, tick: Decimal) -> Result<Decimal> {
    if tick <= Decimal::ZERO {
        return Err(TrailingError::Configuration(format!(
            "tick size must be positive, got {}",
            tick
        )));
    }

    // The remainder is exact; a quotient can round up to the next whole step
    let remainder = price
        .checked_rem(tick)
        .ok_or_else(|| TrailingError::Configuration(format!("{} % {} overflows", price, tick)))?;

    let mut rounded = price - remainder;
    if remainder < Decimal::ZERO {
        rounded -= tick;
    }

    Ok(rounded.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rounds_down_to_tick() {
        assert_eq!(round_to_tick(dec!(101.694), dec!(0.01)).unwrap(), dec!(101.69));
        assert_eq!(round_to_tick(dec!(101.699999), dec!(0.01)).unwrap(), dec!(101.69));
        assert_eq!(round_to_tick(dec!(0.123456), dec!(0.0001)).unwrap(), dec!(0.1234));
    }

    #[test]
    fn test_exact_multiple_is_unchanged() {
        assert_eq!(round_to_tick(dec!(101.69), dec!(0.01)).unwrap(), dec!(101.69));
        assert_eq!(round_to_tick(dec!(250), dec!(5)).unwrap(), dec!(250));
    }

    #[test]
    fn test_non_decimal_tick() {
        assert_eq!(round_to_tick(dec!(1.2349), dec!(0.005)).unwrap(), dec!(1.230));
        assert_eq!(round_to_tick(dec!(17), dec!(2.5)).unwrap(), dec!(15));
    }

    #[test]
    fn test_price_below_one_tick_rounds_to_zero() {
        assert_eq!(round_to_tick(dec!(0.004), dec!(0.01)).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_non_positive_tick_fails_fast() {
        assert!(matches!(
            round_to_tick(dec!(100), Decimal::ZERO),
            Err(TrailingError::Configuration(_))
        ));
        assert!(round_to_tick(dec!(100), dec!(-0.01)).is_err());
    }

    #[test]
    fn test_floor_properties_hold() {
        let ticks = [dec!(0.01), dec!(0.001), dec!(0.05), dec!(0.25), dec!(1), dec!(0.00000001)];
        let mut price = dec!(0.00000003);
        while price < dec!(100000) {
            for tick in ticks {
                let rounded = round_to_tick(price, tick).unwrap();
                assert!(rounded <= price, "{} rounded up to {}", price, rounded);
                assert!(price - rounded < tick, "{} lost a full tick", price);
                assert_eq!(rounded % tick, Decimal::ZERO, "{} not a multiple of {}", rounded, tick);
            }
            price = (price * dec!(1.37) + dec!(0.0031)).round_dp(10);
        }
    }

    #[test]
    fn test_full_precision_prices_never_round_up() {
        let cases = [
            (dec!(2.9999999999999999999999999999), dec!(3), Decimal::ZERO),
            (dec!(5.9999999999999999999999999999), dec!(3), dec!(3)),
            (dec!(0.9999999999999999999999999999), dec!(0.01), dec!(0.99)),
            (dec!(100.99999999999999999999999999), dec!(0.01), dec!(100.99)),
            (dec!(1.2499999999999999999999999999), dec!(0.25), dec!(1)),
        ];
        for (price, tick, expected) in cases {
            let rounded = round_to_tick(price, tick).unwrap();
            assert_eq!(rounded, expected, "{} on tick {}", price, tick);
            assert!(rounded <= price);
            assert!(price - rounded < tick);
        }
    }

    #[test]
    fn test_negative_price_still_floors() {
        assert_eq!(round_to_tick(dec!(-1.234), dec!(0.01)).unwrap(), dec!(-1.24));
    }
}
