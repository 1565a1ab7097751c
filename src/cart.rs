//! Cart

use rustc_hash::FxHashSet;
use rusty_money::{Money, iso::Currency};
use thiserror::Error;

use crate::pricing::{TotalPriceError, total_price, zero};

/// Errors related to cart construction.
#[derive(Debug, Error, PartialEq)]
pub enum CartError {
    /// A line's currency differs from the cart currency (index, line currency, cart currency).
    #[error("Line {0} has currency {1}, but cart has currency {2}")]
    CurrencyMismatch(usize, &'static str, &'static str),

    /// A line has a quantity of zero.
    #[error("Line {0} has a quantity of zero")]
    ZeroQuantity(usize),

    /// A line has a negative unit price.
    #[error("Line {0} has a negative unit price")]
    NegativePrice(usize),

    /// Line or cart totals could not be calculated.
    #[error(transparent)]
    TotalPrice(#[from] TotalPriceError),
}

/// A single SKU in a cart, with its unit price and quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct CartLine<'a> {
    sku: String,
    unit_price: Money<'a, Currency>,
    quantity: u32,
}

impl<'a> CartLine<'a> {
    /// Create a new cart line.
    pub fn new(sku: impl Into<String>, unit_price: Money<'a, Currency>, quantity: u32) -> Self {
        CartLine {
            sku: sku.into(),
            unit_price,
            quantity,
        }
    }

    /// SKU identifier
    #[must_use]
    pub fn sku(&self) -> &str {
        &self.sku
    }

    /// Price of a single unit
    #[must_use]
    pub fn unit_price(&self) -> &Money<'a, Currency> {
        &self.unit_price
    }

    /// Number of units
    #[must_use]
    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Unit price multiplied by quantity.
    ///
    /// # Errors
    ///
    /// Returns [`TotalPriceError::Overflow`] if the product does not fit in minor units.
    pub fn line_total(&self) -> Result<Money<'a, Currency>, TotalPriceError> {
        let minor = self
            .unit_price
            .to_minor_units()
            .checked_mul(i64::from(self.quantity))
            .ok_or(TotalPriceError::Overflow)?;

        Ok(Money::from_minor(minor, self.unit_price.currency()))
    }
}

/// An ordered set of cart lines sharing one currency.
#[derive(Debug, Clone)]
pub struct Cart<'a> {
    lines: Vec<CartLine<'a>>,
    subtotal: Money<'a, Currency>,
    currency: &'static Currency,
}

impl<'a> Cart<'a> {
    /// Create an empty cart.
    #[must_use]
    pub fn new(currency: &'static Currency) -> Self {
        Cart {
            lines: Vec::new(),
            subtotal: zero(currency),
            currency,
        }
    }

    /// Create a new cart with the given lines.
    ///
    /// # Errors
    ///
    /// Returns a [`CartError`] if a line has a different currency, a zero quantity or a
    /// negative price, or if the subtotal overflows.
    pub fn with_lines(
        lines: impl Into<Vec<CartLine<'a>>>,
        currency: &'static Currency,
    ) -> Result<Self, CartError> {
        let lines = lines.into();

        lines.iter().enumerate().try_for_each(|(i, line)| {
            let line_currency = line.unit_price().currency();

            if line_currency != currency {
                return Err(CartError::CurrencyMismatch(
                    i,
                    line_currency.iso_alpha_code,
                    currency.iso_alpha_code,
                ));
            }

            if line.quantity() == 0 {
                return Err(CartError::ZeroQuantity(i));
            }

            if line.unit_price().to_minor_units() < 0 {
                return Err(CartError::NegativePrice(i));
            }

            Ok(())
        })?;

        let line_totals = lines
            .iter()
            .map(CartLine::line_total)
            .collect::<Result<Vec<_>, _>>()?;

        let subtotal = total_price(currency, line_totals)?;

        Ok(Cart {
            lines,
            subtotal,
            currency,
        })
    }

    /// Sum of all line totals, before any promotion.
    #[must_use]
    pub fn subtotal(&self) -> Money<'a, Currency> {
        self.subtotal
    }

    /// Currency of every line in the cart.
    #[must_use]
    pub fn currency(&self) -> &'static Currency {
        self.currency
    }

    /// Distinct SKUs present in the cart.
    #[must_use]
    pub fn skus(&self) -> FxHashSet<&str> {
        self.lines.iter().map(CartLine::sku).collect()
    }

    /// Iterate over the lines in order.
    pub fn iter(&self) -> impl Iterator<Item = &CartLine<'a>> {
        self.lines.iter()
    }

    /// Number of lines
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the cart has no lines
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
