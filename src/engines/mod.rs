//! Promotion Engines
//!
//! An engine takes an original price and a rule catalog, and returns the reduction details it
//! settled on. [`ExhaustiveEngine`] is the production engine; [`RollbackEngine`] reproduces the
//! legacy sequential behaviour for comparison.

use rusty_money::{Money, MoneyError, iso::Currency};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    discounts::DiscountError,
    pricing::{TotalPriceError, min_price, saturating_sub, total_price, zero},
    rules::{catalog::RuleCatalog, reductions::ReductionDetail},
};

pub mod combinations;
pub mod exhaustive;
pub mod rollback;
pub mod staged;

pub use exhaustive::ExhaustiveEngine;
pub use rollback::{RollbackEngine, StackingMode};

/// Errors raised while evaluating rules.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    /// Percentage arithmetic failed.
    #[error(transparent)]
    Discount(#[from] DiscountError),

    /// A rule amount is in a different currency from the price.
    #[error(transparent)]
    Money(#[from] MoneyError),

    /// Summing reductions failed.
    #[error(transparent)]
    TotalPrice(#[from] TotalPriceError),
}

/// Evaluates a rule catalog against an original price.
pub trait PromotionEngine {
    /// Short engine name, used in logs and receipts.
    fn name(&self) -> &'static str;

    /// Choose and apply rules from `catalog` to `original`.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] if rule arithmetic fails or a rule amount is in another currency.
    fn evaluate<'a>(
        &self,
        original: Money<'a, Currency>,
        catalog: &RuleCatalog<'a>,
    ) -> Result<Evaluation<'a>, EngineError>;
}

/// Outcome of evaluating a catalog against a price.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation<'a> {
    original: Money<'a, Currency>,
    details: Vec<ReductionDetail<'a>>,
    total_discount: Money<'a, Currency>,
    evaluated_combinations: usize,
    pruned_rules: usize,
}

impl<'a> Evaluation<'a> {
    /// Build an evaluation from its reduction details.
    ///
    /// The total discount is the sum of the valid reductions, capped at the original price.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] if a reduction is in another currency or the sum overflows.
    pub fn new(
        original: Money<'a, Currency>,
        details: Vec<ReductionDetail<'a>>,
    ) -> Result<Self, EngineError> {
        let valid_sum = total_price(
            original.currency(),
            details
                .iter()
                .filter(|detail| detail.valid)
                .map(|detail| detail.reduction),
        )?;

        let floored = Money::from_minor(valid_sum.to_minor_units().max(0), original.currency());
        let total_discount = min_price(floored, original)?;

        Ok(Evaluation {
            original,
            details,
            total_discount,
            evaluated_combinations: 1,
            pruned_rules: 0,
        })
    }

    /// An evaluation where no rule fired.
    #[must_use]
    pub fn unchanged(original: Money<'a, Currency>) -> Self {
        Evaluation {
            original,
            details: Vec::new(),
            total_discount: zero(original.currency()),
            evaluated_combinations: 1,
            pruned_rules: 0,
        }
    }

    /// Attach search statistics.
    #[must_use]
    pub fn with_stats(mut self, evaluated_combinations: usize, pruned_rules: usize) -> Self {
        self.evaluated_combinations = evaluated_combinations;
        self.pruned_rules = pruned_rules;
        self
    }

    /// Price before any rule
    #[must_use]
    pub fn original_price(&self) -> Money<'a, Currency> {
        self.original
    }

    /// Reduction details in application order, including invalidated ones.
    #[must_use]
    pub fn details(&self) -> &[ReductionDetail<'a>] {
        &self.details
    }

    /// Sum of valid reductions, never more than the original price.
    #[must_use]
    pub fn total_discount(&self) -> Money<'a, Currency> {
        self.total_discount
    }

    /// Original price minus the total discount.
    ///
    /// # Errors
    ///
    /// Returns a [`MoneyError`] if the currencies differ.
    pub fn pay_price(&self) -> Result<Money<'a, Currency>, MoneyError> {
        saturating_sub(self.original, self.total_discount)
    }

    /// Ids of rules with a valid detail, in application order.
    pub fn applied_rule_ids(&self) -> impl Iterator<Item = &str> {
        self.details
            .iter()
            .filter(|detail| detail.valid)
            .map(|detail| detail.rule_id.as_str())
    }

    /// Number of combinations scored to reach this result.
    #[must_use]
    pub fn evaluated_combinations(&self) -> usize {
        self.evaluated_combinations
    }

    /// Number of rules discarded before enumeration.
    #[must_use]
    pub fn pruned_rules(&self) -> usize {
        self.pruned_rules
    }
}

/// Selects an engine at runtime.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Best legal combination, recomputed from scratch per candidate
    #[default]
    Exhaustive,

    /// Legacy engine stacking each rule on the running price
    RollbackSequential,

    /// Legacy engine computing each rule from the original price
    RollbackParallel,
}

impl PromotionEngine for EngineKind {
    fn name(&self) -> &'static str {
        match self {
            EngineKind::Exhaustive => ExhaustiveEngine::default().name(),
            EngineKind::RollbackSequential => {
                RollbackEngine::new(StackingMode::Sequential).name()
            }
            EngineKind::RollbackParallel => RollbackEngine::new(StackingMode::Parallel).name(),
        }
    }

    fn evaluate<'a>(
        &self,
        original: Money<'a, Currency>,
        catalog: &RuleCatalog<'a>,
    ) -> Result<Evaluation<'a>, EngineError> {
        match self {
            EngineKind::Exhaustive => ExhaustiveEngine::default().evaluate(original, catalog),
            EngineKind::RollbackSequential => {
                RollbackEngine::new(StackingMode::Sequential).evaluate(original, catalog)
            }
            EngineKind::RollbackParallel => {
                RollbackEngine::new(StackingMode::Parallel).evaluate(original, catalog)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::{CNY, USD};
    use testresult::TestResult;

    use crate::rules::{Rule, RuleKind};

    use super::*;

    fn detail(id: &str, reduction: i64, valid: bool) -> ReductionDetail<'static> {
        let rule = Rule::new(id, id, RuleKind::AmountOff(Money::from_minor(reduction, CNY)), 1);
        let mut detail = ReductionDetail::new(
            &rule,
            Money::from_minor(10_000, CNY),
            Money::from_minor(reduction, CNY),
            Money::from_minor(10_000 - reduction, CNY),
        );

        detail.valid = valid;
        detail
    }

    #[test]
    fn total_discount_sums_valid_details() -> TestResult {
        let evaluation = Evaluation::new(
            Money::from_minor(10_000, CNY),
            vec![
                detail("A", 1_000, true),
                detail("B", 500, false),
                detail("C", 250, true),
            ],
        )?;

        assert_eq!(evaluation.total_discount(), Money::from_minor(1_250, CNY));
        assert_eq!(evaluation.pay_price()?, Money::from_minor(8_750, CNY));
        let applied: Vec<&str> = evaluation.applied_rule_ids().collect();

        assert_eq!(applied, ["A", "C"]);

        Ok(())
    }

    #[test]
    fn total_discount_is_capped_at_original() -> TestResult {
        let evaluation = Evaluation::new(
            Money::from_minor(1_000, CNY),
            vec![detail("A", 800, true), detail("B", 800, true)],
        )?;

        assert_eq!(evaluation.total_discount(), Money::from_minor(1_000, CNY));
        assert_eq!(evaluation.pay_price()?, Money::from_minor(0, CNY));

        Ok(())
    }

    #[test]
    fn mixed_currency_details_are_rejected() {
        let mut foreign = detail("A", 100, true);
        foreign.reduction = Money::from_minor(100, USD);

        assert_eq!(
            Evaluation::new(Money::from_minor(1_000, CNY), vec![foreign]),
            Err(EngineError::TotalPrice(TotalPriceError::Money(
                MoneyError::CurrencyMismatch {
                    expected: CNY.iso_alpha_code,
                    actual: USD.iso_alpha_code,
                }
            )))
        );
    }

    #[test]
    fn unchanged_has_no_discount() -> TestResult {
        let evaluation = Evaluation::unchanged(Money::from_minor(4_200, CNY));

        assert!(evaluation.details().is_empty());
        assert_eq!(evaluation.pay_price()?, Money::from_minor(4_200, CNY));
        assert_eq!(evaluation.evaluated_combinations(), 1);

        Ok(())
    }

    #[test]
    fn engine_kind_dispatches_by_name() {
        assert_eq!(EngineKind::Exhaustive.name(), "exhaustive");
        assert_eq!(EngineKind::RollbackSequential.name(), "rollback-sequential");
        assert_eq!(EngineKind::RollbackParallel.name(), "rollback-parallel");
    }
}
