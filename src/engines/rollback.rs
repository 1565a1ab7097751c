//! Rollback Engine
//!
//! The legacy sequential engine, kept to compare against [`ExhaustiveEngine`] and to regenerate
//! regression fixtures.
//!
//! Rules are applied one at a time in priority order. When a rule conflicts with rules already
//! applied, its reduction is compared against theirs: if larger, the earlier details are marked
//! invalid, their reductions are added back to the running price and the rule is recomputed from
//! there. Details written between the invalidated rule and the new one keep the base price they
//! were computed against. That stale base price is the documented behaviour of this engine; do
//! not fix it here.
//!
//! Unlike the exhaustive engine, reductions are not capped at the running price.
//!
//! [`ExhaustiveEngine`]: crate::engines::ExhaustiveEngine

use rusty_money::{Money, iso::Currency};
use smallvec::SmallVec;
use tracing::trace;

use crate::{
    discounts::rate_reduction_minor,
    engines::{EngineError, Evaluation, PromotionEngine},
    pricing::ensure_currency,
    rules::{Rule, RuleKind, catalog::RuleCatalog, reductions::ReductionDetail},
};

/// Which price each rule is computed against.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum StackingMode {
    /// Each rule applies to the running price left by the previous one.
    #[default]
    Sequential,

    /// Each rule applies to the original price.
    Parallel,
}

/// Legacy priority-ordered engine with in-place rollback.
#[derive(Debug, Copy, Clone, Default)]
pub struct RollbackEngine {
    mode: StackingMode,
}

impl RollbackEngine {
    /// Create a rollback engine with the given stacking mode.
    #[must_use]
    pub fn new(mode: StackingMode) -> Self {
        RollbackEngine { mode }
    }

    /// Stacking mode
    #[must_use]
    pub fn mode(&self) -> StackingMode {
        self.mode
    }

    fn base(&self, original: i64, running: i64) -> i64 {
        match self.mode {
            StackingMode::Sequential => running,
            StackingMode::Parallel => original,
        }
    }
}

impl PromotionEngine for RollbackEngine {
    fn name(&self) -> &'static str {
        match self.mode {
            StackingMode::Sequential => "rollback-sequential",
            StackingMode::Parallel => "rollback-parallel",
        }
    }

    fn evaluate<'a>(
        &self,
        original: Money<'a, Currency>,
        catalog: &RuleCatalog<'a>,
    ) -> Result<Evaluation<'a>, EngineError> {
        let currency = original.currency();
        let original_minor = original.to_minor_units();

        let mut running = original_minor;
        let mut details: Vec<ReductionDetail<'a>> = Vec::new();
        // Catalog index of the rule behind each detail
        let mut detail_rules: SmallVec<[usize; 16]> = SmallVec::new();
        let mut applied = 0_u64;

        for (idx, rule) in catalog.iter().enumerate() {
            let mut base = self.base(original_minor, running);

            if !meets_condition(rule, base, currency)? {
                continue;
            }

            let mut reduction = legacy_reduction(rule, base, currency)?;

            if reduction <= 0 {
                continue;
            }

            let conflicts = applied & catalog.exclusions_of(idx);

            if conflicts != 0 {
                let conflicting = |detail_idx: &usize| {
                    detail_rules
                        .get(*detail_idx)
                        .is_some_and(|&rule_idx| conflicts & (1 << rule_idx) != 0)
                };

                let existing: i64 = (0..details.len())
                    .filter(conflicting)
                    .filter_map(|i| details.get(i))
                    .filter(|detail| detail.valid)
                    .map(|detail| detail.reduction.to_minor_units())
                    .sum();

                if reduction <= existing {
                    trace!(
                        rule = rule.id(),
                        reduction,
                        existing,
                        "kept earlier exclusive rules"
                    );
                    continue;
                }

                let invalidated: SmallVec<[usize; 8]> =
                    (0..details.len()).filter(conflicting).collect();

                for i in invalidated {
                    if let Some(detail) = details.get_mut(i) {
                        detail.valid = false;
                    }
                }

                trace!(
                    rule = rule.id(),
                    rollback = existing,
                    "rolled back exclusive rules"
                );

                if existing > 0 {
                    running += existing;
                    base = self.base(original_minor, running);
                    reduction = legacy_reduction(rule, base, currency)?;
                }
            }

            let calculated = running - reduction;

            details.push(ReductionDetail::new(
                rule,
                Money::from_minor(base, currency),
                Money::from_minor(reduction, currency),
                Money::from_minor(calculated, currency),
            ));
            detail_rules.push(idx);
            applied |= 1 << idx;
            running = calculated;
        }

        Evaluation::new(original, details)
    }
}

fn meets_condition(rule: &Rule<'_>, base: i64, currency: &Currency) -> Result<bool, EngineError> {
    match rule.kind() {
        RuleKind::ThresholdAmountOff { threshold, .. } => {
            ensure_currency(threshold, currency)?;

            Ok(base >= threshold.to_minor_units())
        }
        RuleKind::Discount(_) | RuleKind::AmountOff(_) => Ok(true),
    }
}

fn legacy_reduction(rule: &Rule<'_>, base: i64, currency: &Currency) -> Result<i64, EngineError> {
    match rule.kind() {
        RuleKind::Discount(rate) => Ok(rate_reduction_minor(rate, base)?),
        RuleKind::AmountOff(amount) | RuleKind::ThresholdAmountOff { amount, .. } => {
            ensure_currency(amount, currency)?;

            Ok(amount.to_minor_units())
        }
    }
}
