//! Prices

use rusty_money::{Money, MoneyError, iso::Currency};
use thiserror::Error;

/// Errors that can occur while summing prices.
#[derive(Debug, Error, PartialEq)]
pub enum TotalPriceError {
    /// Summing minor units overflowed `i64`.
    #[error("price total overflowed")]
    Overflow,

    /// Wrapped money arithmetic or currency mismatch error.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Zero in the given currency.
#[must_use]
pub fn zero<'a>(currency: &'a Currency) -> Money<'a, Currency> {
    Money::from_minor(0, currency)
}

/// Sums a sequence of prices sharing `currency`.
///
/// An empty sequence sums to zero.
///
/// # Errors
///
/// - [`TotalPriceError::Money`]: a price is in a different currency.
/// - [`TotalPriceError::Overflow`]: the minor-unit total does not fit in an `i64`.
pub fn total_price<'a, I>(
    currency: &'a Currency,
    prices: I,
) -> Result<Money<'a, Currency>, TotalPriceError>
where
    I: IntoIterator<Item = Money<'a, Currency>>,
{
    let total = prices.into_iter().try_fold(0_i64, |acc, price| {
        ensure_currency(&price, currency)?;

        acc.checked_add(price.to_minor_units())
            .ok_or(TotalPriceError::Overflow)
    })?;

    Ok(Money::from_minor(total, currency))
}

/// Subtracts `rhs` from `lhs`, flooring the result at zero.
///
/// # Errors
///
/// Returns [`MoneyError::CurrencyMismatch`] if the currencies differ.
pub fn saturating_sub<'a>(
    lhs: Money<'a, Currency>,
    rhs: Money<'a, Currency>,
) -> Result<Money<'a, Currency>, MoneyError> {
    ensure_currency(&rhs, lhs.currency())?;

    let minor = lhs
        .to_minor_units()
        .saturating_sub(rhs.to_minor_units())
        .max(0);

    Ok(Money::from_minor(minor, lhs.currency()))
}

/// The smaller of two prices.
///
/// # Errors
///
/// Returns [`MoneyError::CurrencyMismatch`] if the currencies differ.
pub fn min_price<'a>(
    lhs: Money<'a, Currency>,
    rhs: Money<'a, Currency>,
) -> Result<Money<'a, Currency>, MoneyError> {
    ensure_currency(&rhs, lhs.currency())?;

    if rhs.to_minor_units() < lhs.to_minor_units() {
        Ok(rhs)
    } else {
        Ok(lhs)
    }
}

/// Returns an error unless `price` is denominated in `currency`.
///
/// # Errors
///
/// Returns [`MoneyError::CurrencyMismatch`] if the currencies differ.
pub fn ensure_currency(price: &Money<'_, Currency>, currency: &Currency) -> Result<(), MoneyError> {
    if price.currency() == currency {
        Ok(())
    } else {
        Err(MoneyError::CurrencyMismatch {
            expected: currency.iso_alpha_code,
            actual: price.currency().iso_alpha_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::{CNY, USD};
    use testresult::TestResult;

    use super::*;

    #[test]
    fn total_price_sums_minor_units() -> TestResult {
        let prices = [Money::from_minor(100, CNY), Money::from_minor(250, CNY)];

        assert_eq!(total_price(CNY, prices)?, Money::from_minor(350, CNY));

        Ok(())
    }

    #[test]
    fn total_price_of_nothing_is_zero() -> TestResult {
        assert_eq!(total_price(CNY, [])?, zero(CNY));

        Ok(())
    }

    #[test]
    fn total_price_rejects_mixed_currencies() {
        let prices = [Money::from_minor(100, CNY), Money::from_minor(250, USD)];

        assert_eq!(
            total_price(CNY, prices),
            Err(TotalPriceError::Money(MoneyError::CurrencyMismatch {
                expected: CNY.iso_alpha_code,
                actual: USD.iso_alpha_code,
            }))
        );
    }

    #[test]
    fn total_price_reports_overflow() {
        let prices = [Money::from_minor(i64::MAX, CNY), Money::from_minor(1, CNY)];

        assert_eq!(total_price(CNY, prices), Err(TotalPriceError::Overflow));
    }

    #[test]
    fn saturating_sub_floors_at_zero() -> TestResult {
        let lhs = Money::from_minor(500, CNY);

        assert_eq!(
            saturating_sub(lhs, Money::from_minor(200, CNY))?,
            Money::from_minor(300, CNY)
        );
        assert_eq!(saturating_sub(lhs, Money::from_minor(900, CNY))?, zero(CNY));

        Ok(())
    }

    #[test]
    fn min_price_picks_the_smaller() -> TestResult {
        let small = Money::from_minor(10, CNY);
        let large = Money::from_minor(20, CNY);

        assert_eq!(min_price(small, large)?, small);
        assert_eq!(min_price(large, small)?, small);

        Ok(())
    }
}
