//! Integration tests for order settlement, driven by the checkout demo scenario.
//!
//! The cart comes to 240.00. Line promotions take 5.00 off each apple and 30.00 off beef and
//! milk pooled together, since that beats 90% milk, so goods come to 200.00. Neither order rule
//! can fire below 240.00 and both are pruned. 200.00 still ships free. Goods coupons G101
//! (70.00), G103 (40.00) and G104 (35.00) then take the goods amount to 55.00, so 12.00 freight
//! comes back. S301 shares the X group with G101 and S304 needs 13.00 of freight, leaving S302
//! and S303 to knock 11.00 off. The customer pays 56.00.

use std::path::PathBuf;

use rusty_money::{
    Money,
    iso::{CNY, Currency},
};
use testresult::TestResult;

use pricewise::{
    config::Config,
    coupons::CouponStatus,
    engines::EngineKind,
    receipt::write_settlement,
    settlement::Settlement,
};

fn cny(minor: i64) -> Money<'static, Currency> {
    Money::from_minor(minor, CNY)
}

fn checkout() -> Result<Config, pricewise::config::ConfigError> {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));

    Config::load(root.join("demos/scenarios/checkout.yml"))
}

fn status_of(settlement: &Settlement<'_>, coupon_no: &str) -> Option<CouponStatus> {
    settlement
        .goods_coupons
        .annotations()
        .iter()
        .chain(settlement.shipping_coupons.annotations())
        .find(|coupon| coupon.coupon_no == coupon_no)
        .map(|coupon| coupon.status)
}

#[test]
fn checkout_scenario_settles_end_to_end() -> TestResult {
    let settlement = checkout()?.settle()?;

    assert_eq!(settlement.original_price, cny(24_000));
    assert_eq!(settlement.line_discount, cny(4_000));
    assert_eq!(settlement.promotion_discount, cny(0));
    assert_eq!(settlement.price_after_promotion, cny(20_000));
    assert_eq!(settlement.goods_discount, cny(14_500));
    assert_eq!(settlement.goods_pay, cny(5_500));
    assert_eq!(settlement.freight_before, cny(0));
    assert_eq!(settlement.freight_after, cny(1_200));
    assert_eq!(settlement.shipping_discount, cny(1_100));
    assert_eq!(settlement.shipping_pay, cny(100));
    assert_eq!(settlement.total_pay, cny(5_600));
    assert_eq!(settlement.total_discount()?, cny(19_600));

    Ok(())
}

#[test]
fn checkout_scenario_annotates_every_coupon() -> TestResult {
    let settlement = checkout()?.settle()?;

    let checked: Vec<&str> = settlement.checked_coupon_numbers().collect();

    assert_eq!(checked, ["G101", "G103", "G104", "S302", "S303"]);
    assert_eq!(status_of(&settlement, "G102"), Some(CouponStatus::GroupTaken));
    assert_eq!(status_of(&settlement, "G105"), Some(CouponStatus::Expired));
    assert_eq!(status_of(&settlement, "S301"), Some(CouponStatus::GroupTaken));
    assert_eq!(status_of(&settlement, "S304"), Some(CouponStatus::BelowThreshold));

    Ok(())
}

#[test]
fn shipping_coupons_are_also_selected_against_the_earlier_freight() -> TestResult {
    let settlement = checkout()?.settle()?;

    assert_eq!(settlement.shipping_coupons_before.base(), cny(0));
    assert_eq!(settlement.shipping_coupons_before.total_discount(), cny(0));
    assert_eq!(settlement.shipping_coupons.base(), cny(1_200));

    Ok(())
}

#[test]
fn line_promotions_pick_the_cheapest_assignment() -> TestResult {
    let settlement = checkout()?.settle()?;
    let pricing = &settlement.line_pricing;

    let applied: Vec<Option<&str>> = pricing
        .lines()
        .iter()
        .map(|line| line.promotion_id.as_deref())
        .collect();
    let adjusts: Vec<(&str, i64)> = pricing
        .adjusts()
        .iter()
        .map(|a| (a.promotion_id.as_str(), a.discount.to_minor_units()))
        .collect();

    assert_eq!(pricing.promoted(), cny(20_000));
    assert_eq!(applied, [Some("P1001"), Some("P2001"), Some("P2001")]);
    assert_eq!(adjusts, [("P2001", 3_000), ("P1001", 1_000)]);
    assert_eq!(pricing.evaluated_plans(), Some(12));

    Ok(())
}

#[test]
fn order_rules_are_checked_against_the_line_promoted_price() -> TestResult {
    let settlement = checkout()?.settle()?;

    assert_eq!(settlement.promotion.applied_rule_ids().count(), 0);
    assert_eq!(settlement.promotion.pruned_rules(), 2);
    assert_eq!(settlement.promotion.evaluated_combinations(), 1);

    Ok(())
}

#[test]
fn line_breakdown_matches_the_order_totals() -> TestResult {
    let settlement = checkout()?.settle()?;

    let shares: Vec<(i64, i64, i64, i64)> = settlement
        .lines
        .iter()
        .map(|line| {
            (
                line.line_discount.to_minor_units(),
                line.promotion_share.to_minor_units(),
                line.coupon_share.to_minor_units(),
                line.pay.to_minor_units(),
            )
        })
        .collect();

    assert_eq!(
        shares,
        [
            (1_000, 0, 3_625, 1_375),
            (2_000, 0, 7_250, 2_750),
            (1_000, 0, 3_625, 1_375),
        ]
    );

    let pay: i64 = shares.iter().map(|&(_, _, _, pay)| pay).sum();

    assert_eq!(pay, settlement.goods_pay.to_minor_units());

    Ok(())
}

#[test]
fn every_engine_agrees_on_the_checkout_scenario() -> TestResult {
    for engine in [
        EngineKind::Exhaustive,
        EngineKind::RollbackSequential,
        EngineKind::RollbackParallel,
    ] {
        let settlement = checkout()?.with_engine(engine).settle()?;

        assert_eq!(settlement.total_pay, cny(5_600), "{engine:?} disagrees");
    }

    Ok(())
}

#[test]
fn receipt_renders_the_checkout_scenario() -> TestResult {
    let settlement = checkout()?.settle()?;

    let mut out = Vec::new();
    write_settlement(&mut out, &settlement)?;
    let receipt = String::from_utf8(out)?;

    for needle in ["BEEF", "APPLE", "MILK", "P2001", "G101", "S304", "Total:"] {
        assert!(receipt.contains(needle), "receipt should mention {needle}");
    }

    Ok(())
}
