//! Constant-product pool conversion and fee math.
//!
//! Inputs and fees round half away from zero to token precision (3 dp).
//! Pool output rounds toward zero, so it stays below the opposite reserve.

use dmm_core::Amount;
use dmm_sidechain::PoolSnapshot;
use rust_decimal::Decimal;

/// Result of converting through a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversion {
    /// Input the pool actually took, at token precision.
    pub consumed: Amount,
    /// Output received for `consumed`.
    pub output: Amount,
}

impl Conversion {
    /// Part of `paid` the conversion did not use.
    pub fn shortfall(&self, paid: Amount) -> Amount {
        if self.consumed < paid {
            paid - self.consumed
        } else {
            Amount::ZERO
        }
    }
}

fn swap(input: Amount, reserve_in: Amount, reserve_out: Amount) -> Option<Conversion> {
    if !input.is_positive() || !reserve_in.is_positive() || !reserve_out.is_positive() {
        return None;
    }

    let consumed = input.round_token();
    let output = reserve_out.inner() * consumed.inner() / (reserve_in.inner() + consumed.inner());
    Some(Conversion {
        consumed,
        output: Amount::new(output).truncate_token(),
    })
}

/// Tokens received for `paid` base currency:
/// `token = paid * quote / (base + paid)`.
///
/// `None` for a non-positive amount or an empty pool.
pub fn quote_from_base(pool: &PoolSnapshot, paid: Amount) -> Option<Conversion> {
    swap(paid, pool.base_quantity, pool.quote_quantity)
}

/// `quote_from_base`, buying at most `max_share_bps` of the token reserve.
///
/// When the full payment would exceed the cap, only the base amount that
/// buys up to the cap is consumed (cut to 3 dp); the rest shows up as
/// `Conversion::shortfall`.
pub fn quote_from_base_capped(
    pool: &PoolSnapshot,
    paid: Amount,
    max_share_bps: u32,
) -> Option<Conversion> {
    let full = quote_from_base(pool, paid)?;
    if max_share_bps >= 10_000 {
        return Some(full);
    }

    let cap = pool.quote_quantity * (Decimal::from(max_share_bps) / Decimal::from(10_000u32));
    if full.output <= cap {
        return Some(full);
    }

    // Inverse of the swap: base needed to take exactly `cap` out
    let needed = pool.base_quantity.inner() * cap.inner() / (pool.quote_quantity - cap).inner();
    quote_from_base(pool, Amount::new(needed).truncate_token())
}

/// Base currency received for `tokens`:
/// `base = tokens * base / (quote + tokens)`.
pub fn quote_to_base(pool: &PoolSnapshot, tokens: Amount) -> Option<Conversion> {
    swap(tokens, pool.quote_quantity, pool.base_quantity)
}

/// Deduct a fee of `fee_bps` basis points.
pub fn apply_fee(amount: Amount, fee_bps: u32) -> Amount {
    let keep = Decimal::ONE - Decimal::from(fee_bps) / Decimal::from(10_000u32);
    (amount * keep).round_token()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pool(base: Decimal, quote: Decimal) -> PoolSnapshot {
        PoolSnapshot::new(Amount::new(base), Amount::new(quote))
    }

    #[test]
    fn test_scenario_conversion_and_fee() {
        let conversion = quote_from_base(&pool(dec!(1000), dec!(2000)), Amount::new(dec!(100))).unwrap();
        assert_eq!(conversion.output.to_wire(), "181.818");
        assert_eq!(conversion.shortfall(Amount::new(dec!(100))), Amount::ZERO);

        let net = apply_fee(conversion.output, 50);
        assert_eq!(net.to_wire(), "180.909");
    }

    #[test]
    fn test_fee() {
        assert_eq!(apply_fee(Amount::new(dec!(100)), 50).to_wire(), "99.500");
        assert_eq!(apply_fee(Amount::new(dec!(100)), 0).to_wire(), "100.000");
    }

    #[test]
    fn test_monotonic_and_bounded_by_reserve() {
        let p = pool(dec!(49089.44612205), dec!(21579621.63656238));
        let mut previous = Amount::ZERO;
        for paid in [dec!(0.001), dec!(1), dec!(10), dec!(1000), dec!(100000), dec!(10000000)] {
            let output = quote_from_base(&p, Amount::new(paid)).unwrap().output;
            assert!(output >= previous);
            assert!(output < p.quote_quantity);
            previous = output;
        }
    }

    #[test]
    fn test_output_stays_below_reserve_of_tiny_pool() {
        let p = pool(dec!(1), dec!(1));
        for paid in [dec!(1), dec!(999), dec!(10000), dec!(1000000000)] {
            let conversion = quote_from_base(&p, Amount::new(paid)).unwrap();
            assert!(conversion.output < p.quote_quantity);
            let back = quote_to_base(&p, Amount::new(paid)).unwrap();
            assert!(back.output < p.base_quantity);
        }

        // 10000 / 10001 = 0.99990..., cut rather than rounded up to 1.000
        let conversion = quote_from_base(&p, Amount::new(dec!(10000))).unwrap();
        assert_eq!(conversion.output.to_wire(), "0.999");
    }

    #[test]
    fn test_output_rounds_toward_zero() {
        // 10 * 10000 / 1010 = 99.0099...
        let conversion = quote_from_base(&pool(dec!(1000), dec!(10000)), Amount::new(dec!(10))).unwrap();
        assert_eq!(conversion.output.to_wire(), "99.009");
    }

    #[test]
    fn test_capped_conversion_consumes_part_of_payment() {
        let p = pool(dec!(1000), dec!(2000));
        let paid = Amount::new(dec!(100));

        // 5% of 2000 is 100 tokens; 100 * 1000 / 1900 = 52.631 base buys them
        let conversion = quote_from_base_capped(&p, paid, 500).unwrap();
        assert_eq!(conversion.consumed.to_wire(), "52.631");
        assert_eq!(conversion.output.to_wire(), "99.998");
        assert_eq!(conversion.shortfall(paid).to_wire(), "47.369");
    }

    #[test]
    fn test_cap_not_reached() {
        let p = pool(dec!(1000), dec!(2000));
        let paid = Amount::new(dec!(100));

        assert_eq!(quote_from_base_capped(&p, paid, 10_000), quote_from_base(&p, paid));
        // 181.818 is under 10% of 2000
        assert_eq!(quote_from_base_capped(&p, paid, 1_000), quote_from_base(&p, paid));
    }

    #[test]
    fn test_cap_too_small_to_fill() {
        assert!(quote_from_base_capped(&pool(dec!(1000), dec!(2000)), Amount::new(dec!(100)), 0).is_none());
    }

    #[test]
    fn test_to_base() {
        // 200 tokens into {base 1000, quote 2000}: 200 * 1000 / 2200
        let conversion = quote_to_base(&pool(dec!(1000), dec!(2000)), Amount::new(dec!(200))).unwrap();
        assert_eq!(conversion.output.to_wire(), "90.909");
    }

    #[test]
    fn test_shortfall_for_excess_precision() {
        let conversion = quote_from_base(&pool(dec!(1000), dec!(2000)), Amount::new(dec!(1.0004))).unwrap();
        assert_eq!(conversion.consumed.to_wire(), "1.000");
        assert_eq!(conversion.shortfall(Amount::new(dec!(1.0004))).inner(), dec!(0.0004));
    }

    #[test]
    fn test_empty_pool() {
        assert!(quote_from_base(&pool(dec!(0), dec!(2000)), Amount::new(dec!(1))).is_none());
        assert!(quote_from_base(&pool(dec!(1000), dec!(2000)), Amount::ZERO).is_none());
    }
}
