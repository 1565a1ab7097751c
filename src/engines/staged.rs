//! Staged Application
//!
//! Applies one combination of rules to a price from scratch. Pay-rate discounts run first, then
//! amount-off and threshold rules, each stage in priority order.

use rusty_money::{Money, iso::Currency};
use smallvec::SmallVec;

use crate::{
    discounts::rate_reduction_minor,
    engines::EngineError,
    pricing::ensure_currency,
    rules::{Rule, RuleKind, reductions::ReductionDetail},
};

/// Result of applying one combination of rules.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedOutcome<'a> {
    /// One detail per rule that fired, in application order
    pub details: Vec<ReductionDetail<'a>>,

    /// Running price after the last rule
    pub final_price: Money<'a, Currency>,
}

impl<'a> StagedOutcome<'a> {
    /// Discount in minor units relative to `original`.
    #[must_use]
    pub fn discount_minor(&self, original: Money<'a, Currency>) -> i64 {
        original.to_minor_units() - self.final_price.to_minor_units()
    }
}

/// Applies `rules` to `original`.
///
/// Reductions never take the running price below zero. Threshold rules whose threshold is not
/// met at their turn are skipped without a detail, as are rules that would reduce by nothing.
///
/// # Errors
///
/// Returns an [`EngineError`] if a rule amount is in another currency or rate arithmetic fails.
pub fn apply_staged<'a, 'r, I>(
    original: Money<'a, Currency>,
    rules: I,
) -> Result<StagedOutcome<'a>, EngineError>
where
    'a: 'r,
    I: IntoIterator<Item = &'r Rule<'a>>,
{
    let mut ordered: SmallVec<[&Rule<'a>; 16]> = rules.into_iter().collect();
    ordered.sort_by_key(|rule| (rule.stage(), rule.priority()));

    let currency = original.currency();
    let mut running = original.to_minor_units();
    let mut details = Vec::with_capacity(ordered.len());

    for rule in ordered {
        let Some(reduction) = staged_reduction(rule, running, currency)? else {
            continue;
        };

        if reduction <= 0 {
            continue;
        }

        let calculated = running - reduction;

        details.push(ReductionDetail::new(
            rule,
            Money::from_minor(running, currency),
            Money::from_minor(reduction, currency),
            Money::from_minor(calculated, currency),
        ));

        running = calculated;
    }

    Ok(StagedOutcome {
        details,
        final_price: Money::from_minor(running, currency),
    })
}

/// Reduction for `rule` at `running`, or `None` if the rule does not fire.
fn staged_reduction(
    rule: &Rule<'_>,
    running: i64,
    currency: &Currency,
) -> Result<Option<i64>, EngineError> {
    let reduction = match rule.kind() {
        RuleKind::Discount(rate) => rate_reduction_minor(rate, running)?,
        RuleKind::AmountOff(amount) => {
            ensure_currency(amount, currency)?;
            amount.to_minor_units()
        }
        RuleKind::ThresholdAmountOff { threshold, amount } => {
            ensure_currency(threshold, currency)?;
            ensure_currency(amount, currency)?;

            if running < threshold.to_minor_units() {
                return Ok(None);
            }

            amount.to_minor_units()
        }
    };

    Ok(Some(reduction.min(running)))
}
