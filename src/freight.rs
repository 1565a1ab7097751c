//! Freight

use rusty_money::{Money, MoneyError, iso::Currency};
use thiserror::Error;

use crate::pricing::{ensure_currency, zero};

/// Errors raised by freight calculation.
#[derive(Debug, Error, PartialEq)]
pub enum FreightError {
    /// The threshold or base freight is negative.
    #[error("freight parameters must not be negative")]
    NegativeParameter,

    /// Wrapped currency mismatch error.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Maps a payable goods amount to a freight charge.
pub trait FreightCalculator<'a> {
    /// Freight charged on `goods_pay`.
    ///
    /// # Errors
    ///
    /// Returns a [`FreightError`] if `goods_pay` is in a different currency.
    fn freight(&self, goods_pay: Money<'a, Currency>) -> Result<Money<'a, Currency>, FreightError>;
}

/// Free shipping at or above a threshold, a flat charge below it.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct StepFreight<'a> {
    free_shipping_threshold: Money<'a, Currency>,
    base_freight: Money<'a, Currency>,
}

impl<'a> StepFreight<'a> {
    /// Create a step freight rule.
    ///
    /// # Errors
    ///
    /// Returns a [`FreightError`] if either amount is negative or the currencies differ.
    pub fn new(
        free_shipping_threshold: Money<'a, Currency>,
        base_freight: Money<'a, Currency>,
    ) -> Result<Self, FreightError> {
        ensure_currency(&base_freight, free_shipping_threshold.currency())?;

        if free_shipping_threshold.to_minor_units() < 0 || base_freight.to_minor_units() < 0 {
            return Err(FreightError::NegativeParameter);
        }

        Ok(StepFreight {
            free_shipping_threshold,
            base_freight,
        })
    }

    /// Goods amount from which shipping is free
    #[must_use]
    pub fn free_shipping_threshold(&self) -> Money<'a, Currency> {
        self.free_shipping_threshold
    }

    /// Freight charged below the threshold
    #[must_use]
    pub fn base_freight(&self) -> Money<'a, Currency> {
        self.base_freight
    }
}

impl<'a, 'f: 'a> FreightCalculator<'a> for StepFreight<'f> {
    fn freight(&self, goods_pay: Money<'a, Currency>) -> Result<Money<'a, Currency>, FreightError> {
        ensure_currency(&goods_pay, self.free_shipping_threshold.currency())?;

        if goods_pay.to_minor_units() >= self.free_shipping_threshold.to_minor_units() {
            Ok(zero(goods_pay.currency()))
        } else {
            Ok(self.base_freight)
        }
    }
}
