//! Price and rate parsing

use decimal_percentage::Percentage;
use num_traits::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rusty_money::{
    Money,
    iso::{CNY, Currency, EUR, GBP, USD},
};

use crate::config::ConfigError;

/// Look up a supported ISO currency by code.
///
/// # Errors
///
/// Returns [`ConfigError::UnknownCurrency`] for codes other than CNY, GBP, USD and EUR.
pub fn parse_currency(code: &str) -> Result<&'static Currency, ConfigError> {
    match code.trim() {
        "CNY" => Ok(CNY),
        "GBP" => Ok(GBP),
        "USD" => Ok(USD),
        "EUR" => Ok(EUR),
        other => Err(ConfigError::UnknownCurrency(other.to_string())),
    }
}

/// Parse a price string (e.g. "199.00 CNY") into money.
///
/// Amounts with more than two decimal places are rounded half away from zero.
///
/// # Errors
///
/// Returns an error if the string is not in the format "AMOUNT CURRENCY", the amount is not a
/// decimal number, or the currency code is not recognised.
pub fn parse_price(s: &str) -> Result<Money<'static, Currency>, ConfigError> {
    let parts: Vec<&str> = s.split_whitespace().collect();

    let [amount, code] = parts.as_slice() else {
        return Err(ConfigError::InvalidPrice(format!(
            "Expected format 'AMOUNT CURRENCY', got: {s}"
        )));
    };

    let minor_units = amount
        .parse::<Decimal>()
        .map_err(|_err| ConfigError::InvalidPrice(s.to_string()))?
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|value| {
            value
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_i64()
        })
        .ok_or_else(|| ConfigError::InvalidPrice(s.to_string()))?;

    Ok(Money::from_minor(minor_units, parse_currency(code)?))
}

/// Parse a price and require it to be in `currency`.
///
/// # Errors
///
/// Returns an error if the price is malformed or in another currency.
pub fn parse_price_in(
    s: &str,
    currency: &'static Currency,
) -> Result<Money<'static, Currency>, ConfigError> {
    let price = parse_price(s)?;

    if price.currency() == currency {
        Ok(price)
    } else {
        Err(ConfigError::CurrencyMismatch(
            currency.iso_alpha_code.to_string(),
            price.currency().iso_alpha_code.to_string(),
        ))
    }
}

/// Parse a pay rate, either as a percentage ("80%") or a fraction ("0.8").
///
/// # Errors
///
/// Returns [`ConfigError::InvalidRate`] if the string is not a number.
pub fn parse_rate(s: &str) -> Result<Percentage, ConfigError> {
    let trimmed = s.trim();
    let invalid = || ConfigError::InvalidRate(s.to_string());

    let fraction = if let Some(percent) = trimmed.strip_suffix('%') {
        percent
            .trim()
            .parse::<Decimal>()
            .map_err(|_err| invalid())?
            .checked_div(Decimal::ONE_HUNDRED)
            .ok_or_else(invalid)?
    } else {
        trimmed.parse::<Decimal>().map_err(|_err| invalid())?
    };

    Percentage::try_from(fraction.normalize().to_string().as_str()).map_err(|_err| invalid())
}
