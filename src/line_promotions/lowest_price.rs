//! Lowest Price Engine
//!
//! Chooses, for every cart line, which of its matching line promotions to take part in (or
//! none), so that the cart's promoted total is as low as possible.
//!
//! Every assignment is scored while the number of assignments stays within the enumeration
//! limit. Past it, each line simply takes its cheapest single-level promotion and group-level
//! promotions are ignored.

use std::cmp::Reverse;

use num_traits::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rusty_money::{Money, iso::Currency};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::{
    allocation::allocate,
    cart::Cart,
    discounts::rate_price_minor,
    line_promotions::{LinePromotion, LinePromotionError, PromotionLevel},
    pricing::zero,
    rules::RuleKind,
};

/// Assignments scored before the engine falls back to single-level promotions only.
pub const DEFAULT_MAX_ENUMERATIONS: u64 = 50_000;

/// One cart line after line promotions.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine<'a> {
    /// SKU of the line
    pub sku: String,

    /// Number of units
    pub quantity: u32,

    /// Unit price multiplied by quantity
    pub line_total: Money<'a, Currency>,

    /// Line total after its promotion
    pub promoted_total: Money<'a, Currency>,

    /// Promotion the line took part in, if it saved anything
    pub promotion_id: Option<String>,

    /// `line_total - promoted_total`
    pub discount: Money<'a, Currency>,
}

/// Total saved by one line promotion across the cart.
#[derive(Debug, Clone, PartialEq)]
pub struct PromotionAdjust<'a> {
    /// Promotion identifier
    pub promotion_id: String,

    /// Promotion name
    pub name: String,

    /// Sum of the line discounts it produced
    pub discount: Money<'a, Currency>,
}

/// Result of pricing a cart's line promotions.
#[derive(Debug, Clone, PartialEq)]
pub struct LinePricing<'a> {
    original: Money<'a, Currency>,
    promoted: Money<'a, Currency>,
    lines: Vec<PricedLine<'a>>,
    adjusts: Vec<PromotionAdjust<'a>>,
    evaluated_plans: Option<u64>,
}

impl<'a> LinePricing<'a> {
    /// Pricing of a cart no line promotion touched.
    ///
    /// # Errors
    ///
    /// Returns a [`LinePromotionError`] if a line total overflows.
    pub fn unchanged(cart: &Cart<'a>) -> Result<Self, LinePromotionError> {
        let lines = cart
            .iter()
            .map(|line| {
                let line_total = line.line_total()?;

                Ok(PricedLine {
                    sku: line.sku().to_string(),
                    quantity: line.quantity(),
                    line_total,
                    promoted_total: line_total,
                    promotion_id: None,
                    discount: zero(cart.currency()),
                })
            })
            .collect::<Result<Vec<_>, LinePromotionError>>()?;

        Ok(LinePricing {
            original: cart.subtotal(),
            promoted: cart.subtotal(),
            lines,
            adjusts: Vec::new(),
            evaluated_plans: Some(0),
        })
    }

    /// Cart subtotal
    #[must_use]
    pub fn original(&self) -> Money<'a, Currency> {
        self.original
    }

    /// Sum of the promoted line totals
    #[must_use]
    pub fn promoted(&self) -> Money<'a, Currency> {
        self.promoted
    }

    /// Amount saved by line promotions
    #[must_use]
    pub fn discount(&self) -> Money<'a, Currency> {
        Money::from_minor(
            self.original.to_minor_units() - self.promoted.to_minor_units(),
            self.original.currency(),
        )
    }

    /// Lines in cart order
    #[must_use]
    pub fn lines(&self) -> &[PricedLine<'a>] {
        &self.lines
    }

    /// Savings per promotion, largest first.
    #[must_use]
    pub fn adjusts(&self) -> &[PromotionAdjust<'a>] {
        &self.adjusts
    }

    /// Number of assignments scored, or `None` when the enumeration limit was exceeded and only
    /// single-level promotions were considered.
    #[must_use]
    pub fn evaluated_plans(&self) -> Option<u64> {
        self.evaluated_plans
    }
}

/// Facts about a cart line that do not change between assignments.
#[derive(Debug, Clone, Copy)]
struct LineFacts<'c> {
    sku: &'c str,
    unit: i64,
    quantity: u32,
    total: i64,
}

/// A line's price under one assignment.
#[derive(Debug, Clone, Copy)]
struct LineState {
    promoted: i64,
    applied: Option<usize>,
}

/// Line prices under one assignment, with their sum.
#[derive(Debug)]
struct Plan {
    promoted: i64,
    states: Vec<LineState>,
}

impl Plan {
    fn from_states(states: Vec<LineState>) -> Self {
        Plan {
            promoted: states.iter().map(|state| state.promoted).sum(),
            states,
        }
    }

    fn unchanged(facts: &[LineFacts<'_>]) -> Self {
        Self::from_states(
            facts
                .iter()
                .map(|line| LineState {
                    promoted: line.total,
                    applied: None,
                })
                .collect(),
        )
    }
}

type Options = SmallVec<[Option<usize>; 4]>;

/// Picks the assignment of line promotions with the lowest promoted total.
#[derive(Debug, Clone, Copy)]
pub struct LowestPriceEngine {
    max_enumerations: u64,
}

impl Default for LowestPriceEngine {
    fn default() -> Self {
        LowestPriceEngine {
            max_enumerations: DEFAULT_MAX_ENUMERATIONS,
        }
    }
}

impl LowestPriceEngine {
    /// Create an engine with the default enumeration limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Score at most `max_enumerations` assignments before falling back.
    #[must_use]
    pub fn with_max_enumerations(mut self, max_enumerations: u64) -> Self {
        self.max_enumerations = max_enumerations;
        self
    }

    /// Enumeration limit
    #[must_use]
    pub fn max_enumerations(&self) -> u64 {
        self.max_enumerations
    }

    /// Price `cart` under the best assignment of `promotions`.
    ///
    /// Each line may take part in any one promotion whose scope matches its SKU, or in none.
    /// A single-level promotion only counts for a line when it lowers the line total. A group
    /// discount is computed on the original totals of the lines assigned to it, capped at their
    /// sum, and spread over them in proportion to those totals. Among assignments with the same
    /// promoted total, the first in enumeration order wins: lines vary in cart order with the
    /// last line fastest, and each line tries no promotion before its promotions in input order.
    ///
    /// # Errors
    ///
    /// Returns a [`LinePromotionError`] if a promotion amount is in another currency from the
    /// cart or arithmetic overflows.
    #[tracing::instrument(
        name = "line_promotions.price",
        skip_all,
        fields(
            lines = cart.len(),
            promotions = promotions.len(),
            evaluated = tracing::field::Empty,
            discount = tracing::field::Empty
        ),
        err
    )]
    pub fn price<'a>(
        &self,
        cart: &Cart<'a>,
        promotions: &[LinePromotion<'a>],
    ) -> Result<LinePricing<'a>, LinePromotionError> {
        if cart.is_empty() {
            return LinePricing::unchanged(cart);
        }

        let currency = cart.currency();

        for promotion in promotions {
            promotion.currency_check(currency)?;
        }

        let facts = cart
            .iter()
            .map(|line| {
                Ok(LineFacts {
                    sku: line.sku(),
                    unit: line.unit_price().to_minor_units(),
                    quantity: line.quantity(),
                    total: line.line_total()?.to_minor_units(),
                })
            })
            .collect::<Result<Vec<_>, LinePromotionError>>()?;

        let options: Vec<Options> = facts
            .iter()
            .map(|line| {
                let matching = promotions
                    .iter()
                    .enumerate()
                    .filter(|(_, promotion)| promotion.matches_sku(line.sku))
                    .map(|(idx, _)| Some(idx));

                std::iter::once(None).chain(matching).collect()
            })
            .collect();

        let (plan, evaluated) = if self.exceeds_limit(&options) {
            debug!(
                max_enumerations = self.max_enumerations,
                "too many assignments, pricing single promotions only"
            );

            (single_only(&facts, promotions)?, None)
        } else {
            let (plan, evaluated) = enumerate(&facts, promotions, &options, currency)?;

            (plan, Some(evaluated))
        };

        let pricing = build_pricing(cart, promotions, &facts, &plan, evaluated);

        let span = tracing::Span::current();
        span.record("evaluated", evaluated.unwrap_or(0));
        span.record("discount", pricing.discount().to_minor_units());

        Ok(pricing)
    }

    fn exceeds_limit(&self, options: &[Options]) -> bool {
        let mut estimated = 1_u64;

        for choices in options {
            let count = u64::try_from(choices.len()).unwrap_or(u64::MAX);
            estimated = estimated.saturating_mul(count);

            if estimated > self.max_enumerations {
                return true;
            }
        }

        false
    }
}

/// Score every assignment; returns the cheapest and how many were scored.
fn enumerate(
    facts: &[LineFacts<'_>],
    promotions: &[LinePromotion<'_>],
    options: &[Options],
    currency: &Currency,
) -> Result<(Plan, u64), LinePromotionError> {
    let mut cursor = vec![0_usize; options.len()];
    let mut assignment: Vec<Option<usize>> = vec![None; options.len()];
    let mut best: Option<Plan> = None;
    let mut evaluated = 0_u64;

    loop {
        for ((slot, choices), &pick) in assignment.iter_mut().zip(options).zip(&cursor) {
            *slot = choices.get(pick).copied().flatten();
        }

        let plan = evaluate_assignment(facts, promotions, &assignment, currency)?;

        evaluated += 1;

        let cheapest = best.as_ref().map_or(i64::MAX, |current| current.promoted);

        if plan.promoted < cheapest {
            trace!(promoted = plan.promoted, ?assignment, "cheaper assignment");
            best = Some(plan);
        }

        if !advance(&mut cursor, options) {
            break;
        }
    }

    Ok((best.unwrap_or_else(|| Plan::unchanged(facts)), evaluated))
}

/// Step to the next assignment, the last line fastest; `false` once every one was visited.
fn advance(cursor: &mut [usize], options: &[Options]) -> bool {
    for (pick, choices) in cursor.iter_mut().zip(options).rev() {
        *pick += 1;

        if *pick < choices.len() {
            return true;
        }

        *pick = 0;
    }

    false
}

fn evaluate_assignment(
    facts: &[LineFacts<'_>],
    promotions: &[LinePromotion<'_>],
    assignment: &[Option<usize>],
    currency: &Currency,
) -> Result<Plan, LinePromotionError> {
    let mut states = Plan::unchanged(facts).states;

    for ((state, line), choice) in states.iter_mut().zip(facts).zip(assignment) {
        let Some(promotion) = choice.and_then(|idx| promotions.get(idx)) else {
            continue;
        };

        if promotion.level() != PromotionLevel::Single {
            continue;
        }

        let promoted = single_line_total(promotion.kind(), line)?;

        if promoted < line.total {
            state.promoted = promoted;
            state.applied = *choice;
        }
    }

    for (idx, promotion) in promotions.iter().enumerate() {
        if promotion.level() != PromotionLevel::Group {
            continue;
        }

        let members: SmallVec<[usize; 8]> = assignment
            .iter()
            .enumerate()
            .filter(|(_, choice)| **choice == Some(idx))
            .map(|(line, _)| line)
            .collect();

        if !members.is_empty() {
            apply_group(idx, promotion, facts, &members, &mut states, currency)?;
        }
    }

    Ok(Plan::from_states(states))
}

/// Line total after a single-level promotion, before checking that it saves anything.
fn single_line_total(kind: &RuleKind<'_>, line: &LineFacts<'_>) -> Result<i64, LinePromotionError> {
    let unit = match kind {
        RuleKind::AmountOff(amount) => (line.unit - amount.to_minor_units()).max(0),
        RuleKind::Discount(rate) => rate_price_minor(rate, line.unit)?,
        RuleKind::ThresholdAmountOff { threshold, amount } => {
            if line.total >= threshold.to_minor_units() {
                let left = line.total - amount.to_minor_units().clamp(0, line.total);

                per_unit(left, line.quantity)?
            } else {
                line.unit
            }
        }
    };

    i64::from(line.quantity)
        .checked_mul(unit)
        .ok_or(LinePromotionError::Overflow)
}

/// `total / quantity`, rounded half away from zero.
fn per_unit(total: i64, quantity: u32) -> Result<i64, LinePromotionError> {
    Decimal::from(total)
        .checked_div(Decimal::from(quantity))
        .ok_or(LinePromotionError::Overflow)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(LinePromotionError::Overflow)
}

fn apply_group(
    idx: usize,
    promotion: &LinePromotion<'_>,
    facts: &[LineFacts<'_>],
    members: &[usize],
    states: &mut [LineState],
    currency: &Currency,
) -> Result<(), LinePromotionError> {
    let weights: SmallVec<[(usize, i64); 8]> = members
        .iter()
        .filter_map(|&line| facts.get(line).map(|fact| (line, fact.total)))
        .collect();

    let group_total = weights
        .iter()
        .try_fold(0_i64, |acc, (_, total)| acc.checked_add(*total))
        .ok_or(LinePromotionError::Overflow)?;

    let discount = match promotion.kind() {
        RuleKind::ThresholdAmountOff { threshold, amount } => {
            if group_total >= threshold.to_minor_units() {
                amount.to_minor_units()
            } else {
                0
            }
        }
        RuleKind::Discount(rate) => group_total - rate_price_minor(rate, group_total)?,
        RuleKind::AmountOff(_) => 0,
    };

    let discount = discount.min(group_total);

    if discount <= 0 {
        return Ok(());
    }

    let shares = allocate(
        Money::from_minor(discount, currency),
        weights
            .iter()
            .map(|&(line, total)| (line, Decimal::from(total))),
    )?;

    for (line, share) in shares {
        let (Some(state), Some(fact)) = (states.get_mut(line), facts.get(line)) else {
            continue;
        };

        let promoted = fact.total - share.to_minor_units();

        if promoted < state.promoted {
            state.promoted = promoted;
            state.applied = Some(idx);
        }
    }

    Ok(())
}

/// Each line takes its cheapest single-level promotion; group promotions are ignored.
fn single_only(
    facts: &[LineFacts<'_>],
    promotions: &[LinePromotion<'_>],
) -> Result<Plan, LinePromotionError> {
    let states = facts
        .iter()
        .map(|line| {
            let mut best = LineState {
                promoted: line.total,
                applied: None,
            };

            for (idx, promotion) in promotions.iter().enumerate() {
                if promotion.level() != PromotionLevel::Single || !promotion.matches_sku(line.sku) {
                    continue;
                }

                let promoted = single_line_total(promotion.kind(), line)?;

                if promoted < best.promoted {
                    best = LineState {
                        promoted,
                        applied: Some(idx),
                    };
                }
            }

            Ok(best)
        })
        .collect::<Result<Vec<_>, LinePromotionError>>()?;

    Ok(Plan::from_states(states))
}

fn build_pricing<'a>(
    cart: &Cart<'a>,
    promotions: &[LinePromotion<'a>],
    facts: &[LineFacts<'_>],
    plan: &Plan,
    evaluated: Option<u64>,
) -> LinePricing<'a> {
    let currency = cart.currency();
    let mut savings = vec![0_i64; promotions.len()];

    let lines = facts
        .iter()
        .zip(&plan.states)
        .map(|(line, state)| {
            let discount = line.total - state.promoted;

            if let Some(saved) = state.applied.and_then(|idx| savings.get_mut(idx)) {
                *saved += discount;
            }

            PricedLine {
                sku: line.sku.to_string(),
                quantity: line.quantity,
                line_total: Money::from_minor(line.total, currency),
                promoted_total: Money::from_minor(state.promoted, currency),
                promotion_id: state
                    .applied
                    .and_then(|idx| promotions.get(idx))
                    .map(|promotion| promotion.id().to_string()),
                discount: Money::from_minor(discount, currency),
            }
        })
        .collect();

    let mut adjusts: Vec<(&LinePromotion<'a>, i64)> = promotions
        .iter()
        .zip(savings)
        .filter(|(_, saved)| *saved > 0)
        .collect();

    adjusts.sort_by_key(|&(_, saved)| Reverse(saved));

    LinePricing {
        original: cart.subtotal(),
        promoted: Money::from_minor(plan.promoted, currency),
        lines,
        adjusts: adjusts
            .into_iter()
            .map(|(promotion, saved)| PromotionAdjust {
                promotion_id: promotion.id().to_string(),
                name: promotion.name().to_string(),
                discount: Money::from_minor(saved, currency),
            })
            .collect(),
        evaluated_plans: evaluated,
    }
}
