//! Allocation
//!
//! Splits an amount across weighted buckets so the parts always add back up to the whole.

use num_traits::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rusty_money::{Money, iso::Currency};
use thiserror::Error;

/// Errors raised while allocating an amount.
#[derive(Debug, Error, PartialEq)]
pub enum AllocationError {
    /// A positive amount has no bucket with a positive weight to go to.
    #[error("no bucket has a positive weight")]
    NoPositiveWeight,

    /// Weight arithmetic overflowed.
    #[error("allocation arithmetic overflowed")]
    Overflow,
}

/// Splits `total` across `weights` in proportion.
///
/// Every bucket with a positive weight except the last receives `total × weight / total weight`,
/// rounded half away from zero to the minor unit and capped at what is still unallocated. The last
/// bucket with a positive weight takes whatever is left. Buckets with a zero or negative weight
/// receive nothing and do not shift anyone else's share. A total that is not positive allocates
/// zero everywhere.
///
/// # Errors
///
/// - [`AllocationError::NoPositiveWeight`]: `total` is positive but no weight is.
/// - [`AllocationError::Overflow`]: the weights are too large to sum or scale.
pub fn allocate<'a, K>(
    total: Money<'a, Currency>,
    weights: impl IntoIterator<Item = (K, Decimal)>,
) -> Result<Vec<(K, Money<'a, Currency>)>, AllocationError> {
    let currency = total.currency();
    let weights: Vec<(K, Decimal)> = weights.into_iter().collect();

    if total.to_minor_units() <= 0 {
        return Ok(weights
            .into_iter()
            .map(|(key, _)| (key, Money::from_minor(0, currency)))
            .collect());
    }

    let total_weight = weights
        .iter()
        .filter(|(_, weight)| is_positive(*weight))
        .try_fold(Decimal::ZERO, |acc, (_, weight)| acc.checked_add(*weight))
        .ok_or(AllocationError::Overflow)?;

    let last_positive = weights
        .iter()
        .rposition(|(_, weight)| is_positive(*weight))
        .ok_or(AllocationError::NoPositiveWeight)?;

    let mut remaining = total.to_minor_units();
    let mut allocations = Vec::with_capacity(weights.len());

    for (idx, (key, weight)) in weights.into_iter().enumerate() {
        let share = if !is_positive(weight) {
            0
        } else if idx == last_positive {
            remaining
        } else {
            proportional_share(total.to_minor_units(), weight, total_weight)?.clamp(0, remaining)
        };

        remaining -= share;
        allocations.push((key, Money::from_minor(share, currency)));
    }

    Ok(allocations)
}

fn is_positive(weight: Decimal) -> bool {
    weight.is_sign_positive() && !weight.is_zero()
}

fn proportional_share(
    total: i64,
    weight: Decimal,
    total_weight: Decimal,
) -> Result<i64, AllocationError> {
    Decimal::from(total)
        .checked_mul(weight)
        .and_then(|scaled| scaled.checked_div(total_weight))
        .ok_or(AllocationError::Overflow)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(AllocationError::Overflow)
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::CNY;
    use testresult::TestResult;

    use super::*;

    fn minors<K>(allocations: &[(K, Money<'_, Currency>)]) -> Vec<i64> {
        allocations
            .iter()
            .map(|(_, money)| money.to_minor_units())
            .collect()
    }

    #[test]
    fn equal_weights_split_evenly_with_remainder_last() -> TestResult {
        let allocations = allocate(
            Money::from_minor(10_000, CNY),
            [("a", Decimal::ONE), ("b", Decimal::ONE), ("c", Decimal::ONE)],
        )?;

        assert_eq!(minors(&allocations), [3_333, 3_333, 3_334]);

        Ok(())
    }

    #[test]
    fn equal_weights_get_equal_shares_before_the_last() -> TestResult {
        let weights = (0..6).map(|i| (i, Decimal::ONE));
        let allocations = allocate(Money::from_minor(100, CNY), weights)?;
        let shares = minors(&allocations);

        assert_eq!(shares, [17, 17, 17, 17, 17, 15]);
        assert_eq!(shares.iter().sum::<i64>(), 100);

        Ok(())
    }

    #[test]
    fn shares_are_proportional() -> TestResult {
        let allocations = allocate(
            Money::from_minor(4_000, CNY),
            [
                ("beef", Decimal::from(16_000)),
                ("apple", Decimal::from(5_000)),
                ("milk", Decimal::from(3_000)),
            ],
        )?;

        assert_eq!(minors(&allocations), [2_667, 833, 500]);
        assert_eq!(minors(&allocations).iter().sum::<i64>(), 4_000);

        Ok(())
    }

    #[test]
    fn zero_and_negative_weights_receive_nothing() -> TestResult {
        let allocations = allocate(
            Money::from_minor(1_000, CNY),
            [
                ("a", Decimal::ONE),
                ("zero", Decimal::ZERO),
                ("b", Decimal::ONE),
                ("negative", Decimal::NEGATIVE_ONE),
            ],
        )?;

        assert_eq!(minors(&allocations), [500, 0, 500, 0]);

        Ok(())
    }

    #[test]
    fn non_positive_total_allocates_zero() -> TestResult {
        let allocations = allocate(
            Money::from_minor(0, CNY),
            [("a", Decimal::ONE), ("b", Decimal::ZERO)],
        )?;

        assert_eq!(minors(&allocations), [0, 0]);

        Ok(())
    }

    #[test]
    fn positive_total_needs_a_positive_weight() {
        assert_eq!(
            allocate(Money::from_minor(100, CNY), [("a", Decimal::ZERO)]),
            Err(AllocationError::NoPositiveWeight)
        );
    }

    #[test]
    fn sums_are_exact_for_awkward_splits() -> TestResult {
        for total in [1, 7, 99, 1_001, 123_457] {
            let weights = (1..=7).map(|i| (i, Decimal::from(i * 13 % 5 + 1)));
            let allocations = allocate(Money::from_minor(total, CNY), weights)?;

            let sum: i64 = minors(&allocations).into_iter().sum();

            assert_eq!(sum, total, "allocations of {total} must add back up");
            assert!(minors(&allocations).iter().all(|&m| m >= 0));
        }

        Ok(())
    }
}
