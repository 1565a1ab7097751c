//! Coupon Selector
//!
//! Greedy per-category coupon selection against a deductible base.

use jiff::Timestamp;
use rustc_hash::FxHashSet;
use rusty_money::{Money, iso::Currency};
use tracing::{debug, trace};

use crate::coupons::{CheckedCoupon, Coupon, CouponCategory, CouponStatus, selection_order};

/// Coupons selected per category unless configured otherwise.
pub const DEFAULT_MAX_COUPONS: usize = 3;

/// Distinct coupon templates selected per category unless configured otherwise.
pub const DEFAULT_MAX_TEMPLATES: usize = 3;

/// Request-scoped facts the selector filters against.
#[derive(Debug, Clone)]
pub struct SelectionContext<'s> {
    now: Timestamp,
    skus: FxHashSet<&'s str>,
    reserved_groups: FxHashSet<&'s str>,
}

impl<'s> SelectionContext<'s> {
    /// Context evaluated at `now`, with no SKUs and no reserved groups.
    #[must_use]
    pub fn new(now: Timestamp) -> Self {
        SelectionContext {
            now,
            skus: FxHashSet::default(),
            reserved_groups: FxHashSet::default(),
        }
    }

    /// SKUs present in the cart, for goods coupon scope checks.
    #[must_use]
    pub fn with_skus(mut self, skus: impl IntoIterator<Item = &'s str>) -> Self {
        self.skus.extend(skus);
        self
    }

    /// Exclusivity groups already taken elsewhere; coupons in them cannot be selected.
    #[must_use]
    pub fn reserving(mut self, groups: impl IntoIterator<Item = &'s str>) -> Self {
        self.reserved_groups.extend(groups);
        self
    }

    /// Evaluation time
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// SKUs in the cart
    #[must_use]
    pub fn skus(&self) -> &FxHashSet<&'s str> {
        &self.skus
    }
}

/// Outcome of selecting coupons for one category.
#[derive(Debug, Clone, PartialEq)]
pub struct CouponSelection<'a> {
    category: CouponCategory,
    base: Money<'a, Currency>,
    annotations: Vec<CheckedCoupon<'a>>,
    total_discount: Money<'a, Currency>,
}

impl<'a> CouponSelection<'a> {
    /// Category the selection was made for
    #[must_use]
    pub fn category(&self) -> CouponCategory {
        self.category
    }

    /// Deductible base the selection was made against
    #[must_use]
    pub fn base(&self) -> Money<'a, Currency> {
        self.base
    }

    /// One annotation per coupon of the category.
    ///
    /// Eligible coupons come first in selection order, followed by filtered coupons in input
    /// order.
    #[must_use]
    pub fn annotations(&self) -> &[CheckedCoupon<'a>] {
        &self.annotations
    }

    /// Selected coupons, in selection order.
    pub fn checked(&self) -> impl Iterator<Item = &CheckedCoupon<'a>> {
        self.annotations.iter().filter(|coupon| coupon.checked)
    }

    /// Sum of the actual discounts of the selected coupons.
    #[must_use]
    pub fn total_discount(&self) -> Money<'a, Currency> {
        self.total_discount
    }

    /// Exclusivity groups of the selected coupons.
    pub fn used_groups(&self) -> impl Iterator<Item = &str> {
        self.checked()
            .filter_map(|coupon| coupon.exclusive_group.as_deref())
    }
}

/// Greedy coupon selector with a fixed ordering policy.
#[derive(Debug, Copy, Clone)]
pub struct CouponSelector {
    max_coupons: usize,
    max_templates: usize,
}

impl Default for CouponSelector {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_COUPONS)
    }
}

impl CouponSelector {
    /// Selector taking at most `max_coupons` coupons per category.
    #[must_use]
    pub fn new(max_coupons: usize) -> Self {
        CouponSelector {
            max_coupons,
            max_templates: DEFAULT_MAX_TEMPLATES,
        }
    }

    /// Take coupons from at most `max_templates` distinct templates per category.
    ///
    /// Further coupons from a template that is already used are still allowed.
    #[must_use]
    pub fn with_template_limit(mut self, max_templates: usize) -> Self {
        self.max_templates = max_templates;
        self
    }

    /// Maximum coupons per category
    #[must_use]
    pub fn max_coupons(&self) -> usize {
        self.max_coupons
    }

    /// Maximum distinct templates per category
    #[must_use]
    pub fn max_templates(&self) -> usize {
        self.max_templates
    }

    /// Select `category` coupons against `base`.
    ///
    /// Coupons that are expired, above their threshold, out of scope (goods only) or in another
    /// currency are filtered out. The rest are sorted by [`selection_order`] and taken greedily:
    /// each takes `min(face value, remaining base)`, at most one per exclusivity group and from
    /// at most the template limit of distinct templates, until the coupon limit is reached or
    /// nothing is left to deduct. A coupon with no face value is still taken, deducts nothing and
    /// uses up a slot.
    ///
    /// Coupons of the other category are ignored.
    pub fn select<'a>(
        &self,
        category: CouponCategory,
        base: Money<'a, Currency>,
        coupons: &[Coupon<'a>],
        context: &SelectionContext<'_>,
    ) -> CouponSelection<'a> {
        let currency = base.currency();

        let mut eligible: Vec<&Coupon<'a>> = Vec::new();
        let mut filtered: Vec<CheckedCoupon<'a>> = Vec::new();

        for coupon in coupons.iter().filter(|coupon| coupon.category() == category) {
            match filter_status(category, &base, coupon, context) {
                Some(status) => {
                    trace!(
                        coupon_no = coupon.coupon_no(),
                        status = status.label(),
                        "filtered coupon"
                    );
                    filtered.push(CheckedCoupon::rejected(coupon, currency, status));
                }
                None => eligible.push(coupon),
            }
        }

        eligible.sort_by(|a, b| selection_order(a, b));

        let mut remaining = base.to_minor_units().max(0);
        let mut total = 0_i64;
        let mut selected = 0_usize;
        let mut used_groups: FxHashSet<&str> = context.reserved_groups.iter().copied().collect();
        let mut used_templates: FxHashSet<&str> = FxHashSet::default();

        let mut annotations = Vec::with_capacity(eligible.len() + filtered.len());

        for coupon in eligible {
            let status = if selected >= self.max_coupons {
                Some(CouponStatus::LimitReached)
            } else if used_templates.len() >= self.max_templates
                && !used_templates.contains(coupon.template_key())
            {
                Some(CouponStatus::TemplateLimitReached)
            } else if remaining == 0 {
                Some(CouponStatus::BaseExhausted)
            } else if coupon
                .exclusive_group()
                .is_some_and(|group| used_groups.contains(group))
            {
                Some(CouponStatus::GroupTaken)
            } else {
                None
            };

            if let Some(status) = status {
                trace!(
                    coupon_no = coupon.coupon_no(),
                    status = status.label(),
                    "skipped coupon"
                );
                annotations.push(CheckedCoupon::rejected(coupon, currency, status));
                continue;
            }

            let actual = coupon.face_value().to_minor_units().clamp(0, remaining);

            remaining -= actual;
            total += actual;
            selected += 1;
            used_templates.insert(coupon.template_key());

            if let Some(group) = coupon.exclusive_group() {
                used_groups.insert(group);
            }

            annotations.push(CheckedCoupon::selected(coupon, Money::from_minor(actual, currency)));
        }

        annotations.extend(filtered);

        debug!(
            %category,
            base = base.to_minor_units(),
            selected,
            discount = total,
            "selected coupons"
        );

        CouponSelection {
            category,
            base,
            annotations,
            total_discount: Money::from_minor(total, currency),
        }
    }
}

/// Reason a coupon is not eligible at all, or `None` if it may be selected.
fn filter_status(
    category: CouponCategory,
    base: &Money<'_, Currency>,
    coupon: &Coupon<'_>,
    context: &SelectionContext<'_>,
) -> Option<CouponStatus> {
    let foreign_threshold = coupon
        .threshold()
        .is_some_and(|threshold| threshold.currency() != base.currency());

    if coupon.face_value().currency() != base.currency() || foreign_threshold {
        Some(CouponStatus::CurrencyMismatch)
    } else if coupon.is_expired(context.now) {
        Some(CouponStatus::Expired)
    } else if !coupon.meets_threshold(base) {
        Some(CouponStatus::BelowThreshold)
    } else if category == CouponCategory::Goods && !coupon.covers_any(&context.skus) {
        Some(CouponStatus::OutOfScope)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::{CNY, USD};
    use testresult::TestResult;

    use super::*;

    fn cny(minor: i64) -> Money<'static, Currency> {
        Money::from_minor(minor, CNY)
    }

    fn goods(no: &str, minor: i64) -> Coupon<'static> {
        Coupon::new(no, CouponCategory::Goods, cny(minor))
    }

    fn shipping(no: &str, minor: i64) -> Coupon<'static> {
        Coupon::new(no, CouponCategory::Shipping, cny(minor))
    }

    fn now() -> Result<Timestamp, jiff::Error> {
        "2026-03-01T00:00:00Z".parse()
    }

    fn status_of(selection: &CouponSelection<'_>, no: &str) -> Option<CouponStatus> {
        selection
            .annotations()
            .iter()
            .find(|c| c.coupon_no == no)
            .map(|c| c.status)
    }

    #[test]
    fn empty_catalog_yields_no_discount() -> TestResult {
        let selection = CouponSelector::default().select(
            CouponCategory::Goods,
            cny(20_000),
            &[],
            &SelectionContext::new(now()?),
        );

        assert!(selection.annotations().is_empty());
        assert_eq!(selection.total_discount(), cny(0));

        Ok(())
    }

    #[test]
    fn takes_highest_face_values_up_to_the_limit() -> TestResult {
        let coupons = [
            goods("TEN", 1_000),
            goods("THIRTY", 3_000),
            goods("TWENTY", 2_000),
            goods("FIVE", 500),
        ];

        let selection = CouponSelector::new(2).select(
            CouponCategory::Goods,
            cny(20_000),
            &coupons,
            &SelectionContext::new(now()?),
        );

        let checked: Vec<&str> = selection.checked().map(|c| c.coupon_no.as_str()).collect();

        assert_eq!(checked, ["THIRTY", "TWENTY"]);
        assert_eq!(selection.total_discount(), cny(5_000));
        assert_eq!(
            status_of(&selection, "TEN"),
            Some(CouponStatus::LimitReached)
        );

        Ok(())
    }

    #[test]
    fn last_coupon_is_capped_at_the_remaining_base() -> TestResult {
        let coupons = [shipping("A", 1_000), shipping("B", 600), shipping("C", 500)];

        let selection = CouponSelector::default().select(
            CouponCategory::Shipping,
            cny(1_200),
            &coupons,
            &SelectionContext::new(now()?),
        );

        let discounts: Vec<_> = selection.checked().map(|c| c.actual_discount).collect();

        assert_eq!(discounts, [cny(1_000), cny(200)]);
        assert_eq!(selection.total_discount(), cny(1_200));
        assert_eq!(
            status_of(&selection, "C"),
            Some(CouponStatus::BaseExhausted)
        );

        Ok(())
    }

    #[test]
    fn one_coupon_per_exclusive_group() -> TestResult {
        let coupons = [
            goods("A", 7_000).with_exclusive_group("X"),
            goods("B", 5_000).with_exclusive_group("X"),
            goods("C", 4_000),
        ];

        let selection = CouponSelector::default().select(
            CouponCategory::Goods,
            cny(20_000),
            &coupons,
            &SelectionContext::new(now()?),
        );

        let checked: Vec<&str> = selection.checked().map(|c| c.coupon_no.as_str()).collect();

        assert_eq!(checked, ["A", "C"]);
        assert_eq!(status_of(&selection, "B"), Some(CouponStatus::GroupTaken));
        assert_eq!(selection.used_groups().collect::<Vec<_>>(), ["X"]);

        Ok(())
    }

    #[test]
    fn reserved_groups_block_selection() -> TestResult {
        let coupons = [
            shipping("A", 1_000).with_exclusive_group("X"),
            shipping("B", 600),
        ];
        let context = SelectionContext::new(now()?).reserving(["X"]);

        let selection = CouponSelector::default().select(
            CouponCategory::Shipping,
            cny(1_200),
            &coupons,
            &context,
        );

        let checked: Vec<&str> = selection.checked().map(|c| c.coupon_no.as_str()).collect();

        assert_eq!(checked, ["B"]);

        Ok(())
    }

    #[test]
    fn filters_explain_themselves() -> TestResult {
        let past: Timestamp = "2026-02-01T00:00:00Z".parse()?;

        let coupons = [
            goods("EXPIRED", 1_000).with_expiry(past),
            goods("HIGH", 1_000).with_threshold(cny(50_000)),
            goods("SCOPED", 1_000).with_sku_scope(["PORK"]),
            Coupon::new("DOLLAR", CouponCategory::Goods, Money::from_minor(1_000, USD)),
            shipping("SHIP", 1_000),
            goods("OK", 1_000).with_sku_scope(["BEEF"]),
        ];

        let context = SelectionContext::new(now()?).with_skus(["BEEF", "MILK"]);
        let selection = CouponSelector::default().select(
            CouponCategory::Goods,
            cny(20_000),
            &coupons,
            &context,
        );

        let statuses: Vec<(&str, CouponStatus)> = selection
            .annotations()
            .iter()
            .map(|c| (c.coupon_no.as_str(), c.status))
            .collect();

        assert_eq!(
            statuses,
            [
                ("OK", CouponStatus::Selected),
                ("EXPIRED", CouponStatus::Expired),
                ("HIGH", CouponStatus::BelowThreshold),
                ("SCOPED", CouponStatus::OutOfScope),
                ("DOLLAR", CouponStatus::CurrencyMismatch),
            ]
        );

        Ok(())
    }

    #[test]
    fn zero_face_value_coupons_are_taken_and_use_a_slot() -> TestResult {
        let coupons = [goods("A", 1_000), goods("FREE", 0), goods("B", 500)];
        let context = SelectionContext::new(now()?);

        let roomy = CouponSelector::new(3).select(
            CouponCategory::Goods,
            cny(20_000),
            &coupons,
            &context,
        );

        let free = roomy
            .annotations()
            .iter()
            .find(|c| c.coupon_no == "FREE")
            .ok_or("Expected FREE annotation")?;

        assert!(free.checked);
        assert_eq!(free.actual_discount, cny(0));
        assert_eq!(free.status, CouponStatus::Selected);
        assert_eq!(roomy.checked().count(), 3);
        assert_eq!(roomy.total_discount(), cny(1_500));

        let tight = CouponSelector::new(2).select(
            CouponCategory::Goods,
            cny(20_000),
            &coupons,
            &context,
        );

        assert_eq!(
            status_of(&tight, "FREE"),
            Some(CouponStatus::LimitReached)
        );

        Ok(())
    }

    #[test]
    fn distinct_templates_are_limited() -> TestResult {
        let coupons = [
            goods("A1", 3_000).with_template("T1"),
            goods("B1", 2_500).with_template("T2"),
            goods("A2", 2_000).with_template("T1"),
            goods("C1", 1_500).with_template("T3"),
        ];

        let selector = CouponSelector::new(5).with_template_limit(2);
        let selection = selector.select(
            CouponCategory::Goods,
            cny(20_000),
            &coupons,
            &SelectionContext::new(now()?),
        );

        let checked: Vec<&str> = selection.checked().map(|c| c.coupon_no.as_str()).collect();

        assert_eq!(checked, ["A1", "B1", "A2"]);
        assert_eq!(selection.total_discount(), cny(7_500));
        assert_eq!(
            status_of(&selection, "C1"),
            Some(CouponStatus::TemplateLimitReached)
        );

        Ok(())
    }

    #[test]
    fn coupons_without_a_template_count_on_their_own() -> TestResult {
        let coupons = [goods("A", 3_000), goods("B", 2_000), goods("C", 1_000)];

        let selector = CouponSelector::new(5).with_template_limit(2);
        let selection = selector.select(
            CouponCategory::Goods,
            cny(20_000),
            &coupons,
            &SelectionContext::new(now()?),
        );

        assert_eq!(selection.checked().count(), 2);
        assert_eq!(
            status_of(&selection, "C"),
            Some(CouponStatus::TemplateLimitReached)
        );

        Ok(())
    }

    #[test]
    fn shipping_coupons_ignore_sku_scope() -> TestResult {
        let coupons = [shipping("A", 500).with_sku_scope(["PORK"])];
        let context = SelectionContext::new(now()?).with_skus(["BEEF"]);

        let selection = CouponSelector::default().select(
            CouponCategory::Shipping,
            cny(1_200),
            &coupons,
            &context,
        );

        assert_eq!(selection.total_discount(), cny(500));

        Ok(())
    }

    #[test]
    fn zero_base_selects_nothing() -> TestResult {
        let coupons = [shipping("A", 500)];

        let selection = CouponSelector::default().select(
            CouponCategory::Shipping,
            cny(0),
            &coupons,
            &SelectionContext::new(now()?),
        );

        assert_eq!(selection.checked().count(), 0);
        assert_eq!(
            status_of(&selection, "A"),
            Some(CouponStatus::BaseExhausted)
        );

        Ok(())
    }

    #[test]
    fn selection_is_deterministic() -> TestResult {
        let coupons = [
            goods("A", 1_000),
            goods("B", 1_000).with_sku_scope(["BEEF"]),
            goods("C", 1_000).with_exclusive_group("X"),
            goods("D", 2_000).with_exclusive_group("X"),
        ];

        let context = SelectionContext::new(now()?).with_skus(["BEEF"]);
        let selector = CouponSelector::default();

        assert_eq!(
            selector.select(CouponCategory::Goods, cny(3_500), &coupons, &context),
            selector.select(CouponCategory::Goods, cny(3_500), &coupons, &context)
        );

        Ok(())
    }
}
