//! Reduction Details

use rusty_money::{Money, iso::Currency};

use crate::rules::Rule;

/// Record of one rule firing against a running price.
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionDetail<'a> {
    /// Identifier of the rule that fired
    pub rule_id: String,

    /// Name of the rule that fired
    pub rule_name: String,

    /// Running price immediately before the rule fired
    pub base_price: Money<'a, Currency>,

    /// Amount taken off
    pub reduction: Money<'a, Currency>,

    /// Running price immediately after the rule fired
    pub calculated_price: Money<'a, Currency>,

    /// False once the rollback engine has invalidated this detail
    pub valid: bool,
}

impl<'a> ReductionDetail<'a> {
    /// Create a valid detail for `rule`.
    pub fn new(
        rule: &Rule<'_>,
        base_price: Money<'a, Currency>,
        reduction: Money<'a, Currency>,
        calculated_price: Money<'a, Currency>,
    ) -> Self {
        ReductionDetail {
            rule_id: rule.id().to_string(),
            rule_name: rule.name().to_string(),
            base_price,
            reduction,
            calculated_price,
            valid: true,
        }
    }
}
