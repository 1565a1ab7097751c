//! Discounts

use decimal_percentage::Percentage;
use num_traits::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Errors specific to discount calculations.
#[derive(Debug, Error, PartialEq)]
pub enum DiscountError {
    /// Percentage calculation could not be safely converted.
    #[error("percentage conversion overflowed or was not finite")]
    PercentConversion,
}

/// The underlying decimal fraction of a percentage (`0.25` for 25%).
#[must_use]
pub fn fraction(percent: &Percentage) -> Decimal {
    *percent * Decimal::ONE
}

/// Reduction produced by a pay-rate discount.
///
/// A rate of `0.8` means the customer pays 80%, so the reduction is 20% of `minor`.
///
/// # Errors
///
/// Returns [`DiscountError::PercentConversion`] if the product cannot be represented.
pub fn rate_reduction_minor(rate: &Percentage, minor: i64) -> Result<i64, DiscountError> {
    let complement = Decimal::ONE
        .checked_sub(fraction(rate))
        .ok_or(DiscountError::PercentConversion)?;

    fraction_of_minor(complement, minor)
}

/// Price left after a pay-rate discount.
///
/// The price itself is rounded, so `rate_price_minor(rate, m)` and
/// `m - rate_reduction_minor(rate, m)` can differ by one minor unit on a midpoint.
///
/// # Errors
///
/// Returns [`DiscountError::PercentConversion`] if the product cannot be represented.
pub fn rate_price_minor(rate: &Percentage, minor: i64) -> Result<i64, DiscountError> {
    fraction_of_minor(fraction(rate), minor)
}

fn fraction_of_minor(fraction: Decimal, minor: i64) -> Result<i64, DiscountError> {
    let minor = Decimal::from_i64(minor).ok_or(DiscountError::PercentConversion)?;

    fraction
        .checked_mul(minor)
        .ok_or(DiscountError::PercentConversion)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(DiscountError::PercentConversion)
}
