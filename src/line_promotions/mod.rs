//! Line Promotions
//!
//! SKU-scoped promotions priced against individual cart lines, before any order-level rule.
//!
//! Each cart line takes part in at most one line promotion. A single-level promotion reprices
//! the lines assigned to it one by one; a group-level promotion pools the lines assigned to it
//! and spreads one discount over them. [`LowestPriceEngine`] chooses the assignment.

use rusty_money::{MoneyError, iso::Currency};
use serde::Deserialize;
use smallvec::SmallVec;
use thiserror::Error;

use crate::{
    allocation::AllocationError,
    discounts::DiscountError,
    pricing::{TotalPriceError, ensure_currency},
    rules::RuleKind,
};

pub mod lowest_price;

pub use lowest_price::{
    DEFAULT_MAX_ENUMERATIONS, LinePricing, LowestPriceEngine, PricedLine, PromotionAdjust,
};

/// Errors raised while building or pricing line promotions.
#[derive(Debug, Error, PartialEq)]
pub enum LinePromotionError {
    /// A group promotion was given a per-unit amount off.
    #[error("group promotion {0} cannot take a fixed amount off each unit")]
    GroupAmountOff(String),

    /// Rate arithmetic failed.
    #[error(transparent)]
    Discount(#[from] DiscountError),

    /// A group discount could not be spread over its lines.
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    /// A line total could not be calculated.
    #[error(transparent)]
    TotalPrice(#[from] TotalPriceError),

    /// A promotion amount is in another currency from the cart.
    #[error(transparent)]
    Money(#[from] MoneyError),

    /// Unit price arithmetic overflowed.
    #[error("line promotion arithmetic overflowed")]
    Overflow,
}

/// How a line promotion treats the lines assigned to it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionLevel {
    /// Each assigned line is repriced on its own
    Single,

    /// Assigned lines are pooled and share one discount
    Group,
}

/// A SKU-scoped promotion template
#[derive(Debug, Clone)]
pub struct LinePromotion<'a> {
    id: String,
    name: String,
    level: PromotionLevel,
    kind: RuleKind<'a>,
    sku_scope: SmallVec<[String; 4]>,
}

impl<'a> LinePromotion<'a> {
    /// Create a single-level promotion that applies to every SKU.
    ///
    /// `AmountOff` takes the amount off each unit, `Discount` reprices each unit and
    /// `ThresholdAmountOff` takes the amount off the line once the line total reaches the
    /// threshold.
    pub fn single(id: impl Into<String>, name: impl Into<String>, kind: RuleKind<'a>) -> Self {
        LinePromotion {
            id: id.into(),
            name: name.into(),
            level: PromotionLevel::Single,
            kind,
            sku_scope: SmallVec::new(),
        }
    }

    /// Create a group-level promotion that applies to every SKU.
    ///
    /// # Errors
    ///
    /// Returns [`LinePromotionError::GroupAmountOff`] for an `AmountOff` kind, which has no
    /// meaning for a pooled group of lines.
    pub fn group(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: RuleKind<'a>,
    ) -> Result<Self, LinePromotionError> {
        let id = id.into();

        if let RuleKind::AmountOff(_) = kind {
            return Err(LinePromotionError::GroupAmountOff(id));
        }

        Ok(LinePromotion {
            id,
            name: name.into(),
            level: PromotionLevel::Group,
            kind,
            sku_scope: SmallVec::new(),
        })
    }

    /// Create a promotion at `level`.
    ///
    /// # Errors
    ///
    /// See [`LinePromotion::group`].
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        level: PromotionLevel,
        kind: RuleKind<'a>,
    ) -> Result<Self, LinePromotionError> {
        match level {
            PromotionLevel::Single => Ok(Self::single(id, name, kind)),
            PromotionLevel::Group => Self::group(id, name, kind),
        }
    }

    /// Restrict the promotion to `skus`.
    #[must_use]
    pub fn with_sku_scope<I, S>(mut self, skus: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sku_scope.extend(skus.into_iter().map(Into::into));
        self.sku_scope.sort_unstable();
        self.sku_scope.dedup();
        self
    }

    /// Promotion identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Level
    #[must_use]
    pub fn level(&self) -> PromotionLevel {
        self.level
    }

    /// Pricing effect
    #[must_use]
    pub fn kind(&self) -> &RuleKind<'a> {
        &self.kind
    }

    /// SKUs the promotion is limited to; empty when it applies to every SKU.
    #[must_use]
    pub fn sku_scope(&self) -> &[String] {
        &self.sku_scope
    }

    /// Whether a line with `sku` may take part.
    #[must_use]
    pub fn matches_sku(&self, sku: &str) -> bool {
        self.sku_scope.is_empty() || self.sku_scope.iter().any(|scoped| scoped == sku)
    }

    pub(crate) fn currency_check(&self, currency: &Currency) -> Result<(), MoneyError> {
        match &self.kind {
            RuleKind::Discount(_) => Ok(()),
            RuleKind::AmountOff(amount) => ensure_currency(amount, currency),
            RuleKind::ThresholdAmountOff { threshold, amount } => {
                ensure_currency(threshold, currency)?;
                ensure_currency(amount, currency)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use decimal_percentage::Percentage;
    use rusty_money::{Money, iso::CNY};
    use testresult::TestResult;

    use super::*;

    #[test]
    fn empty_scope_matches_every_sku() {
        let kind = RuleKind::Discount(Percentage::from(0.9));
        let promotion = LinePromotion::single("P", "10% off", kind);

        assert!(promotion.matches_sku("BEEF"));
        assert!(promotion.matches_sku("MILK"));
    }

    #[test]
    fn scope_limits_the_skus() {
        let kind = RuleKind::AmountOff(Money::from_minor(500, CNY));
        let promotion =
            LinePromotion::single("P", "5 off", kind).with_sku_scope(["MILK", "APPLE", "MILK"]);

        assert_eq!(promotion.sku_scope(), ["APPLE", "MILK"]);
        assert!(promotion.matches_sku("APPLE"));
        assert!(!promotion.matches_sku("BEEF"));
    }

    #[test]
    fn group_rejects_a_per_unit_amount() {
        let kind = RuleKind::AmountOff(Money::from_minor(500, CNY));
        let result = LinePromotion::group("G", "5 off", kind);

        assert_eq!(
            result.err(),
            Some(LinePromotionError::GroupAmountOff("G".to_string()))
        );
    }

    #[test]
    fn new_dispatches_on_level() -> TestResult {
        let kind = RuleKind::ThresholdAmountOff {
            threshold: Money::from_minor(15_000, CNY),
            amount: Money::from_minor(3_000, CNY),
        };

        let group = LinePromotion::new("G", "30 off 150", PromotionLevel::Group, kind)?;
        let single = LinePromotion::new("S", "30 off 150", PromotionLevel::Single, kind)?;

        assert_eq!(group.level(), PromotionLevel::Group);
        assert_eq!(single.level(), PromotionLevel::Single);

        Ok(())
    }
}
