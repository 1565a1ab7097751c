//! Coupons
//!
//! Read-only coupon templates and the annotations the selector produces for them.

use std::{cmp::Ordering, fmt};

use jiff::Timestamp;
use rustc_hash::FxHashSet;
use rusty_money::{Money, iso::Currency};
use serde::Deserialize;
use smallvec::SmallVec;

pub mod selector;

/// What a coupon can be deducted from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponCategory {
    /// Deducted from the goods amount
    Goods,

    /// Deducted from the freight
    Shipping,
}

impl fmt::Display for CouponCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CouponCategory::Goods => f.write_str("goods"),
            CouponCategory::Shipping => f.write_str("shipping"),
        }
    }
}

/// How widely a coupon applies; narrower scopes sort first.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScopeBreadth {
    /// Limited to this many SKUs
    Skus(usize),

    /// Applies to every SKU
    Universal,
}

/// A coupon template
#[derive(Debug, Clone, PartialEq)]
pub struct Coupon<'a> {
    coupon_no: String,
    category: CouponCategory,
    face_value: Money<'a, Currency>,
    threshold: Option<Money<'a, Currency>>,
    sku_scope: SmallVec<[String; 4]>,
    expires_at: Option<Timestamp>,
    exclusive_group: Option<String>,
    template_id: Option<String>,
}

impl<'a> Coupon<'a> {
    /// Create a universal coupon with no threshold, expiry, exclusivity group or template.
    pub fn new(
        coupon_no: impl Into<String>,
        category: CouponCategory,
        face_value: Money<'a, Currency>,
    ) -> Self {
        Coupon {
            coupon_no: coupon_no.into(),
            category,
            face_value,
            threshold: None,
            sku_scope: SmallVec::new(),
            expires_at: None,
            exclusive_group: None,
            template_id: None,
        }
    }

    /// Require the deductible base to be at least `threshold`.
    #[must_use]
    pub fn with_threshold(mut self, threshold: Money<'a, Currency>) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Restrict the coupon to carts containing at least one of `skus`.
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

    /// Expire the coupon at `expires_at`.
    #[must_use]
    pub fn with_expiry(mut self, expires_at: Timestamp) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Put the coupon in an exclusivity group.
    #[must_use]
    pub fn with_exclusive_group(mut self, group: impl Into<String>) -> Self {
        self.exclusive_group = Some(group.into());
        self
    }

    /// Issue the coupon from template `template_id`.
    #[must_use]
    pub fn with_template(mut self, template_id: impl Into<String>) -> Self {
        self.template_id = Some(template_id.into());
        self
    }

    /// Coupon number
    #[must_use]
    pub fn coupon_no(&self) -> &str {
        &self.coupon_no
    }

    /// Category
    #[must_use]
    pub fn category(&self) -> CouponCategory {
        self.category
    }

    /// Face value
    #[must_use]
    pub fn face_value(&self) -> Money<'a, Currency> {
        self.face_value
    }

    /// Minimum deductible base, if any
    #[must_use]
    pub fn threshold(&self) -> Option<Money<'a, Currency>> {
        self.threshold
    }

    /// SKUs the coupon is limited to; empty for universal coupons.
    #[must_use]
    pub fn sku_scope(&self) -> &[String] {
        &self.sku_scope
    }

    /// Expiry time, if any
    #[must_use]
    pub fn expires_at(&self) -> Option<Timestamp> {
        self.expires_at
    }

    /// Exclusivity group, if any
    #[must_use]
    pub fn exclusive_group(&self) -> Option<&str> {
        self.exclusive_group.as_deref()
    }

    /// Template the coupon was issued from, if any
    #[must_use]
    pub fn template_id(&self) -> Option<&str> {
        self.template_id.as_deref()
    }

    /// Key counted against the template limit; coupons without a template count on their own.
    #[must_use]
    pub fn template_key(&self) -> &str {
        self.template_id.as_deref().unwrap_or(&self.coupon_no)
    }

    /// How widely the coupon applies.
    #[must_use]
    pub fn scope_breadth(&self) -> ScopeBreadth {
        if self.sku_scope.is_empty() {
            ScopeBreadth::Universal
        } else {
            ScopeBreadth::Skus(self.sku_scope.len())
        }
    }

    /// Whether the coupon expired before `now`.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at < now)
    }

    /// Whether `base` reaches the coupon's threshold.
    #[must_use]
    pub fn meets_threshold(&self, base: &Money<'_, Currency>) -> bool {
        self.threshold
            .is_none_or(|threshold| threshold.to_minor_units() <= base.to_minor_units())
    }

    /// Whether the coupon applies to a cart with these SKUs.
    #[must_use]
    pub fn covers_any(&self, skus: &FxHashSet<&str>) -> bool {
        self.sku_scope.is_empty() || self.sku_scope.iter().any(|sku| skus.contains(sku.as_str()))
    }
}

/// Order in which eligible coupons are considered.
///
/// Compares, in turn: face value (highest first), scope breadth (narrowest first), expiry
/// (soonest first, coupons that never expire last) and threshold (highest first, none counting
/// as zero).
pub fn selection_order(a: &Coupon<'_>, b: &Coupon<'_>) -> Ordering {
    b.face_value
        .to_minor_units()
        .cmp(&a.face_value.to_minor_units())
        .then_with(|| a.scope_breadth().cmp(&b.scope_breadth()))
        .then_with(|| expiry_order(a.expires_at, b.expires_at))
        .then_with(|| threshold_minor(b).cmp(&threshold_minor(a)))
}

fn expiry_order(a: Option<Timestamp>, b: Option<Timestamp>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn threshold_minor(coupon: &Coupon<'_>) -> i64 {
    coupon.threshold.map_or(0, |threshold| threshold.to_minor_units())
}

/// Why a coupon was or was not selected.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CouponStatus {
    /// Selected and deducted
    Selected,

    /// Expired before the evaluation time
    Expired,

    /// The deductible base is below the coupon threshold
    BelowThreshold,

    /// None of the coupon's SKUs are in the cart
    OutOfScope,

    /// Another coupon in the same exclusivity group was already taken
    GroupTaken,

    /// The maximum number of coupons was already selected
    LimitReached,

    /// Coupons from the maximum number of distinct templates were already selected
    TemplateLimitReached,

    /// Nothing was left to deduct from
    BaseExhausted,

    /// The coupon is in a different currency from the base
    CurrencyMismatch,
}

impl CouponStatus {
    /// Short human readable label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            CouponStatus::Selected => "selected",
            CouponStatus::Expired => "expired",
            CouponStatus::BelowThreshold => "below threshold",
            CouponStatus::OutOfScope => "out of scope",
            CouponStatus::GroupTaken => "group taken",
            CouponStatus::LimitReached => "limit reached",
            CouponStatus::TemplateLimitReached => "template limit reached",
            CouponStatus::BaseExhausted => "nothing left to deduct",
            CouponStatus::CurrencyMismatch => "currency mismatch",
        }
    }
}

/// A coupon annotated with the selector's decision.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedCoupon<'a> {
    /// Coupon number
    pub coupon_no: String,

    /// Category
    pub category: CouponCategory,

    /// Face value
    pub face_value: Money<'a, Currency>,

    /// Exclusivity group, if any
    pub exclusive_group: Option<String>,

    /// Whether the coupon was selected
    pub checked: bool,

    /// Amount actually deducted; zero unless checked
    pub actual_discount: Money<'a, Currency>,

    /// Reason for the decision
    pub status: CouponStatus,
}

impl<'a> CheckedCoupon<'a> {
    /// Annotate a coupon that was not selected.
    pub fn rejected(coupon: &Coupon<'a>, currency: &'a Currency, status: CouponStatus) -> Self {
        CheckedCoupon {
            coupon_no: coupon.coupon_no.clone(),
            category: coupon.category,
            face_value: coupon.face_value,
            exclusive_group: coupon.exclusive_group.clone(),
            checked: false,
            actual_discount: Money::from_minor(0, currency),
            status,
        }
    }

    /// Annotate a selected coupon.
    pub fn selected(coupon: &Coupon<'a>, actual_discount: Money<'a, Currency>) -> Self {
        CheckedCoupon {
            coupon_no: coupon.coupon_no.clone(),
            category: coupon.category,
            face_value: coupon.face_value,
            exclusive_group: coupon.exclusive_group.clone(),
            checked: true,
            actual_discount,
            status: CouponStatus::Selected,
        }
    }
}
