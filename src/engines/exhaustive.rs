//! Exhaustive Engine
//!
//! Scores every legal combination of rules with [`apply_staged`] and keeps the best one. Each
//! candidate starts again from the original price, so earlier candidates cannot leave stale state
//! behind.
//!
//! The search is exponential in the number of rules; [`RuleCatalog`] limits its size at load time.

use rusty_money::{Money, iso::Currency};
use tracing::debug;

use crate::{
    engines::{
        EngineError, Evaluation, PromotionEngine,
        combinations::LegalCombinations,
        staged::{StagedOutcome, apply_staged},
    },
    pricing::ensure_currency,
    rules::{RuleKind, catalog::RuleCatalog},
};

/// Picks the legal combination with the largest discount.
///
/// Ties go to the combination that fires fewer rules, then to the lowest mask (the combination
/// built from the highest-priority rules).
#[derive(Debug, Clone, Copy)]
pub struct ExhaustiveEngine {
    prune_unreachable: bool,
}

impl Default for ExhaustiveEngine {
    fn default() -> Self {
        ExhaustiveEngine {
            prune_unreachable: true,
        }
    }
}

impl ExhaustiveEngine {
    /// Create an engine that prunes threshold rules the original price cannot reach.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable pruning of unreachable threshold rules.
    ///
    /// Prices only decrease while rules apply, so a threshold above the original price can never
    /// be met. Pruning does not change the result, only the number of combinations scored.
    #[must_use]
    pub fn with_pruning(mut self, prune_unreachable: bool) -> Self {
        self.prune_unreachable = prune_unreachable;
        self
    }

    /// Mask of rules worth enumerating, and how many were pruned.
    fn candidate_universe(
        &self,
        original: Money<'_, Currency>,
        catalog: &RuleCatalog<'_>,
    ) -> Result<(u64, usize), EngineError> {
        let mut universe = catalog.full_mask();

        if !self.prune_unreachable {
            return Ok((universe, 0));
        }

        let mut pruned = 0;

        for (idx, rule) in catalog.iter().enumerate() {
            if let RuleKind::ThresholdAmountOff { threshold, .. } = rule.kind() {
                ensure_currency(threshold, original.currency())?;

                if threshold.to_minor_units() > original.to_minor_units() {
                    universe &= !(1 << idx);
                    pruned += 1;
                }
            }
        }

        Ok((universe, pruned))
    }
}

/// Best candidate seen so far.
struct Best<'a> {
    discount: i64,
    mask: u64,
    outcome: StagedOutcome<'a>,
}

impl Best<'_> {
    fn is_beaten_by(&self, discount: i64, outcome: &StagedOutcome<'_>) -> bool {
        discount > self.discount
            || (discount == self.discount && outcome.details.len() < self.outcome.details.len())
    }
}

impl PromotionEngine for ExhaustiveEngine {
    fn name(&self) -> &'static str {
        "exhaustive"
    }

    #[tracing::instrument(
        name = "engines.exhaustive.evaluate",
        skip_all,
        fields(
            rule_count = catalog.len(),
            evaluated = tracing::field::Empty,
            pruned = tracing::field::Empty,
            discount = tracing::field::Empty
        ),
        err
    )]
    fn evaluate<'a>(
        &self,
        original: Money<'a, Currency>,
        catalog: &RuleCatalog<'a>,
    ) -> Result<Evaluation<'a>, EngineError> {
        let (universe, pruned) = self.candidate_universe(original, catalog)?;

        let mut best: Option<Best<'a>> = None;
        let mut evaluated = 0_usize;

        for mask in LegalCombinations::within(catalog, universe) {
            let outcome = apply_staged(original, catalog.rules_in(mask))?;
            let discount = outcome.discount_minor(original);

            evaluated += 1;

            let replace = best
                .as_ref()
                .is_none_or(|current| current.is_beaten_by(discount, &outcome));

            if replace {
                best = Some(Best {
                    discount,
                    mask,
                    outcome,
                });
            }
        }

        let span = tracing::Span::current();
        span.record("evaluated", evaluated);
        span.record("pruned", pruned);

        let Some(best) = best else {
            return Ok(Evaluation::unchanged(original).with_stats(evaluated, pruned));
        };

        span.record("discount", best.discount);

        debug!(
            mask = best.mask,
            fired = best.outcome.details.len(),
            discount = best.discount,
            "selected combination"
        );

        Ok(Evaluation::new(original, best.outcome.details)?.with_stats(evaluated, pruned))
    }
}

#[cfg(test)]
mod tests {
    use decimal_percentage::Percentage;
    use rusty_money::iso::CNY;
    use testresult::TestResult;

    use crate::rules::Rule;

    use super::*;

    fn cny(minor: i64) -> Money<'static, Currency> {
        Money::from_minor(minor, CNY)
    }

    fn threshold(id: &str, threshold: i64, amount: i64, priority: i32) -> Rule<'static> {
        Rule::new(
            id,
            id,
            RuleKind::ThresholdAmountOff {
                threshold: cny(threshold),
                amount: cny(amount),
            },
            priority,
        )
    }

    #[test]
    fn empty_catalog_returns_the_original_price() -> TestResult {
        let evaluation = ExhaustiveEngine::new().evaluate(cny(30_000), &RuleCatalog::default())?;

        assert!(evaluation.details().is_empty());
        assert_eq!(evaluation.total_discount(), cny(0));
        assert_eq!(evaluation.pay_price()?, cny(30_000));
        assert_eq!(evaluation.evaluated_combinations(), 1);

        Ok(())
    }

    #[test]
    fn picks_the_best_exclusive_alternative() -> TestResult {
        let catalog = RuleCatalog::new([
            threshold("A", 10_000, 1_500, 1).exclusive_with(["B"]),
            threshold("B", 15_000, 2_500, 2),
        ])?;

        let evaluation = ExhaustiveEngine::new().evaluate(cny(20_000), &catalog)?;

        assert_eq!(evaluation.applied_rule_ids().collect::<Vec<_>>(), ["B"]);
        assert_eq!(evaluation.total_discount(), cny(2_500));
        assert_eq!(evaluation.pay_price()?, cny(17_500));

        Ok(())
    }

    #[test]
    fn ties_prefer_fewer_rules_then_lower_mask() -> TestResult {
        // Both "A" alone and "B" alone save 10; "C" never fires after either.
        let catalog = RuleCatalog::new([
            Rule::new("A", "A", RuleKind::AmountOff(cny(1_000)), 1).exclusive_with(["B"]),
            Rule::new("B", "B", RuleKind::AmountOff(cny(1_000)), 2),
            threshold("C", 10_000, 500, 3),
        ])?;

        let evaluation = ExhaustiveEngine::new().evaluate(cny(10_000), &catalog)?;

        assert_eq!(evaluation.applied_rule_ids().collect::<Vec<_>>(), ["A"]);
        assert_eq!(evaluation.total_discount(), cny(1_000));

        Ok(())
    }

    #[test]
    fn unreachable_thresholds_are_pruned() -> TestResult {
        let catalog = RuleCatalog::new([
            Rule::new("R", "10% off", RuleKind::Discount(Percentage::from(0.9)), 1),
            threshold("HIGH", 50_000, 5_000, 2),
        ])?;

        let pruned = ExhaustiveEngine::new().evaluate(cny(30_000), &catalog)?;
        let unpruned = ExhaustiveEngine::new()
            .with_pruning(false)
            .evaluate(cny(30_000), &catalog)?;

        assert_eq!(pruned.pruned_rules(), 1);
        assert_eq!(pruned.evaluated_combinations(), 2);
        assert_eq!(unpruned.pruned_rules(), 0);
        assert_eq!(unpruned.evaluated_combinations(), 4);
        assert_eq!(pruned.details(), unpruned.details());

        Ok(())
    }

    #[test]
    fn evaluation_is_deterministic() -> TestResult {
        let catalog = RuleCatalog::new([
            Rule::new("R1", "10% off", RuleKind::Discount(Percentage::from(0.9)), 1)
                .exclusive_with(["R2"]),
            threshold("R3", 26_000, 2_000, 2),
            Rule::new("R2", "20% off", RuleKind::Discount(Percentage::from(0.8)), 3),
        ])?;

        let engine = ExhaustiveEngine::new();

        assert_eq!(
            engine.evaluate(cny(30_000), &catalog)?,
            engine.evaluate(cny(30_000), &catalog)?
        );

        Ok(())
    }
}
