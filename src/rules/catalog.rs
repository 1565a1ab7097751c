//! Rule Catalog
//!
//! Validated, priority-ordered rules with a symmetric exclusivity relation.
//!
//! Rules are addressed by their index in priority order, so a set of rules fits in a `u64` mask.
//! Exclusivity is stored as one adjacency mask per rule, making "are these two exclusive" a single
//! bit test.

use decimal_percentage::Percentage;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::{
    discounts::fraction,
    rules::{Rule, RuleKind},
};

/// Largest catalog addressable by a `u64` rule mask.
pub const MAX_RULES: usize = 63;

/// Default catalog size limit; enumeration is exponential in this value.
pub const DEFAULT_MAX_RULES: usize = 20;

/// Errors raised while loading a rule catalog.
#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    /// Two rules share an identifier.
    #[error("duplicate rule id {0}")]
    DuplicateRuleId(String),

    /// A rule declares exclusivity with a rule that is not in the catalog.
    #[error("rule {rule} is exclusive with unknown rule {partner}")]
    UnknownExclusivePartner {
        /// Declaring rule
        rule: String,

        /// Missing partner id
        partner: String,
    },

    /// A rule declares itself as exclusive.
    #[error("rule {0} is declared exclusive with itself")]
    SelfExclusion(String),

    /// More rules than the catalog limit allows.
    #[error("catalog has {count} rules, more than the limit of {max}")]
    TooManyRules {
        /// Number of rules supplied
        count: usize,

        /// Effective limit
        max: usize,
    },

    /// A pay rate outside `0..=1`.
    #[error("rule {0} has a pay rate outside 0..=1")]
    InvalidRate(String),

    /// A negative amount or threshold.
    #[error("rule {0} has a negative amount")]
    NegativeAmount(String),
}

/// Priority-ordered rules and their exclusivity relation.
#[derive(Debug, Clone, Default)]
pub struct RuleCatalog<'a> {
    rules: Vec<Rule<'a>>,
    index: FxHashMap<String, usize>,
    exclusions: Vec<u64>,
}

impl<'a> RuleCatalog<'a> {
    /// Load a catalog with the default size limit.
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogError`] if the rules are invalid, see [`RuleCatalog::with_limit`].
    pub fn new(rules: impl Into<Vec<Rule<'a>>>) -> Result<Self, CatalogError> {
        Self::with_limit(rules, DEFAULT_MAX_RULES)
    }

    /// Load a catalog allowing up to `max_rules` rules (never more than [`MAX_RULES`]).
    ///
    /// Rules are stably sorted by priority. Exclusivity declared on either side applies to both.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::TooManyRules`]: more rules than the limit.
    /// - [`CatalogError::DuplicateRuleId`]: two rules share an id.
    /// - [`CatalogError::InvalidRate`] / [`CatalogError::NegativeAmount`]: a malformed rule.
    /// - [`CatalogError::SelfExclusion`]: a rule excludes itself.
    /// - [`CatalogError::UnknownExclusivePartner`]: a partner id is missing.
    pub fn with_limit(
        rules: impl Into<Vec<Rule<'a>>>,
        max_rules: usize,
    ) -> Result<Self, CatalogError> {
        let mut rules = rules.into();
        let max = max_rules.min(MAX_RULES);

        if rules.len() > max {
            return Err(CatalogError::TooManyRules {
                count: rules.len(),
                max,
            });
        }

        rules.iter().try_for_each(validate_rule)?;
        rules.sort_by_key(Rule::priority);

        let mut index = FxHashMap::default();

        for (idx, rule) in rules.iter().enumerate() {
            if index.insert(rule.id().to_string(), idx).is_some() {
                return Err(CatalogError::DuplicateRuleId(rule.id().to_string()));
            }
        }

        let mut exclusions = vec![0_u64; rules.len()];

        for (idx, rule) in rules.iter().enumerate() {
            for partner in rule.declared_exclusions() {
                if partner == rule.id() {
                    return Err(CatalogError::SelfExclusion(rule.id().to_string()));
                }

                let Some(&other) = index.get(partner.as_str()) else {
                    return Err(CatalogError::UnknownExclusivePartner {
                        rule: rule.id().to_string(),
                        partner: partner.clone(),
                    });
                };

                if let Some(mask) = exclusions.get_mut(idx) {
                    *mask |= 1 << other;
                }

                if let Some(mask) = exclusions.get_mut(other) {
                    *mask |= 1 << idx;
                }
            }
        }

        Ok(RuleCatalog {
            rules,
            index,
            exclusions,
        })
    }

    /// Number of rules
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the catalog has no rules
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule at a priority-order index.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&Rule<'a>> {
        self.rules.get(idx)
    }

    /// Priority-order index of a rule id.
    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Iterate rules in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &Rule<'a>> {
        self.rules.iter()
    }

    /// Mask of every rule in the catalog.
    #[must_use]
    pub fn full_mask(&self) -> u64 {
        mask_below(self.rules.len())
    }

    /// Mask of the rules exclusive with the rule at `idx`.
    #[must_use]
    pub fn exclusions_of(&self, idx: usize) -> u64 {
        self.exclusions.get(idx).copied().unwrap_or_default()
    }

    /// Whether two rules (by index) are mutually exclusive.
    #[must_use]
    pub fn is_exclusive(&self, a: usize, b: usize) -> bool {
        a < MAX_RULES && b < MAX_RULES && self.exclusions_of(a) & (1 << b) != 0
    }

    /// Whether a set of rules contains no mutually exclusive pair.
    #[must_use]
    pub fn is_legal(&self, mask: u64) -> bool {
        indices(mask).all(|idx| self.exclusions_of(idx) & mask == 0)
    }

    /// Rules in a mask, in priority order.
    pub fn rules_in(&self, mask: u64) -> impl Iterator<Item = &Rule<'a>> {
        indices(mask).filter_map(|idx| self.rules.get(idx))
    }
}

/// Set bit positions of a mask, lowest first.
pub fn indices(mask: u64) -> impl Iterator<Item = usize> {
    let mut remaining = mask;

    std::iter::from_fn(move || {
        if remaining == 0 {
            return None;
        }

        let idx = usize::try_from(remaining.trailing_zeros()).ok()?;
        remaining &= remaining - 1;

        Some(idx)
    })
}

/// Mask with the lowest `n` bits set.
#[must_use]
pub fn mask_below(n: usize) -> u64 {
    if n >= 64 { u64::MAX } else { (1_u64 << n) - 1 }
}

fn validate_rule(rule: &Rule<'_>) -> Result<(), CatalogError> {
    match rule.kind() {
        RuleKind::Discount(rate) => {
            if is_pay_rate(rate) {
                Ok(())
            } else {
                Err(CatalogError::InvalidRate(rule.id().to_string()))
            }
        }
        RuleKind::AmountOff(amount) => {
            if amount.to_minor_units() < 0 {
                Err(CatalogError::NegativeAmount(rule.id().to_string()))
            } else {
                Ok(())
            }
        }
        RuleKind::ThresholdAmountOff { threshold, amount } => {
            if threshold.to_minor_units() < 0 || amount.to_minor_units() < 0 {
                Err(CatalogError::NegativeAmount(rule.id().to_string()))
            } else {
                Ok(())
            }
        }
    }
}

fn is_pay_rate(rate: &Percentage) -> bool {
    let value = fraction(rate);

    (Decimal::ZERO..=Decimal::ONE).contains(&value)
}
