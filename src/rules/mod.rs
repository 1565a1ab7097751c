//! Promotion Rules
//!
//! Read-only rule templates. Engines evaluate rules against a price; they never mutate them.

use decimal_percentage::Percentage;
use rusty_money::{Money, iso::Currency};
use smallvec::SmallVec;

pub mod catalog;
pub mod reductions;

/// The pricing effect of a rule.
#[derive(Debug, Copy, Clone)]
pub enum RuleKind<'a> {
    /// Multiply the running price by a pay rate (`0.8` pays 80%, a 20% reduction).
    Discount(Percentage),

    /// Subtract a fixed amount.
    AmountOff(Money<'a, Currency>),

    /// Subtract `amount` when the running price is at least `threshold`.
    ThresholdAmountOff {
        /// Minimum running price, inclusive
        threshold: Money<'a, Currency>,

        /// Amount subtracted once the threshold is met
        amount: Money<'a, Currency>,
    },
}

impl RuleKind<'_> {
    /// The application stage this kind of rule belongs to.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            RuleKind::Discount(_) => Stage::Multiplicative,
            RuleKind::AmountOff(_) | RuleKind::ThresholdAmountOff { .. } => Stage::Additive,
        }
    }
}

/// Rules are applied stage by stage; every multiplicative rule runs before any additive one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Pay-rate discounts
    Multiplicative,

    /// Amount-off and threshold amount-off reductions
    Additive,
}

/// A promotional rule
#[derive(Debug, Clone)]
pub struct Rule<'a> {
    id: String,
    name: String,
    kind: RuleKind<'a>,
    priority: i32,
    exclusive_with: SmallVec<[String; 4]>,
}

impl<'a> Rule<'a> {
    /// Create a new rule with no exclusivity partners.
    ///
    /// Lower `priority` values take precedence.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: RuleKind<'a>,
        priority: i32,
    ) -> Self {
        Rule {
            id: id.into(),
            name: name.into(),
            kind,
            priority,
            exclusive_with: SmallVec::new(),
        }
    }

    /// Declare rules this rule cannot be combined with.
    ///
    /// Declaring on one side is enough; the catalog makes the relation symmetric.
    #[must_use]
    pub fn exclusive_with<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusive_with.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Rule identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pricing effect
    #[must_use]
    pub fn kind(&self) -> &RuleKind<'a> {
        &self.kind
    }

    /// Priority, lower first
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Stage of the rule's kind
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.kind.stage()
    }

    /// Declared exclusivity partners, as written.
    #[must_use]
    pub fn declared_exclusions(&self) -> &[String] {
        &self.exclusive_with
    }
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::CNY;

    use super::*;

    #[test]
    fn stage_follows_kind() {
        let discount = Rule::new("R1", "10% off", RuleKind::Discount(Percentage::from(0.9)), 1);
        let amount_off = Rule::new(
            "R2",
            "5 off",
            RuleKind::AmountOff(Money::from_minor(500, CNY)),
            2,
        );
        let threshold = Rule::new(
            "R3",
            "20 off 260",
            RuleKind::ThresholdAmountOff {
                threshold: Money::from_minor(26_000, CNY),
                amount: Money::from_minor(2_000, CNY),
            },
            3,
        );

        assert_eq!(discount.stage(), Stage::Multiplicative);
        assert_eq!(amount_off.stage(), Stage::Additive);
        assert_eq!(threshold.stage(), Stage::Additive);
        assert!(Stage::Multiplicative < Stage::Additive);
    }

    #[test]
    fn exclusive_with_accumulates_ids() {
        let rule = Rule::new("R1", "10% off", RuleKind::Discount(Percentage::from(0.9)), 1)
            .exclusive_with(["R2"])
            .exclusive_with(vec![String::from("R4")]);

        assert_eq!(rule.declared_exclusions(), ["R2", "R4"]);
        assert_eq!(rule.id(), "R1");
        assert_eq!(rule.name(), "10% off");
        assert_eq!(rule.priority(), 1);
    }
}
