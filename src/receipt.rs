//! Receipt
//!
//! Renders a [`Settlement`] as terminal tables: cart lines, line promotions, order promotion
//! reductions, coupon decisions and a payment summary.

use std::{
    io,
    ops::{Range, RangeInclusive},
};

use rusty_money::{Money, MoneyError, iso::Currency};
use tabled::{
    builder::Builder,
    settings::{
        Alignment, Color, Style, Theme,
        object::{Columns, Rows},
    },
};
use thiserror::Error;

use crate::{coupons::CheckedCoupon, settlement::Settlement};

const BORDER_CHARS: RangeInclusive<char> = '\u{2500}'..='\u{257F}';
const DIM: &str = "\x1b[90m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Errors that can occur when writing a receipt.
#[derive(Debug, Error)]
pub enum ReceiptError {
    /// Wrapper for money errors.
    #[error(transparent)]
    Money(#[from] MoneyError),

    /// IO error
    #[error("IO error")]
    IO,
}

/// Writes the settlement receipt.
///
/// # Errors
///
/// Returns an error if the output cannot be written or the settlement mixes currencies.
pub fn write_settlement(
    mut out: impl io::Write,
    settlement: &Settlement<'_>,
) -> Result<(), ReceiptError> {
    write_table(&mut out, line_rows(settlement), Columns::new(1..6))?;

    if !settlement.line_pricing.adjusts().is_empty() {
        write_table(&mut out, line_promotion_rows(settlement), Columns::new(2..3))?;
    }

    if !settlement.promotion.details().is_empty() {
        write_table(&mut out, promotion_rows(settlement), Columns::new(2..5))?;
    }

    let coupons: Vec<&CheckedCoupon<'_>> = settlement
        .goods_coupons
        .annotations()
        .iter()
        .chain(settlement.shipping_coupons.annotations())
        .collect();

    if !coupons.is_empty() {
        write_table(&mut out, coupon_rows(&coupons), Columns::new(2..4))?;
    }

    write_summary(&mut out, settlement)
}

fn line_rows(settlement: &Settlement<'_>) -> Builder {
    let mut builder = Builder::default();

    builder.push_record([
        "SKU",
        "Line Total",
        "Line Promo",
        "Promotion",
        "Coupons",
        "Pay",
    ]);

    for line in &settlement.lines {
        builder.push_record([
            line.sku.clone(),
            line.line_total.to_string(),
            savings(line.line_discount),
            savings(line.promotion_share),
            savings(line.coupon_share),
            line.pay.to_string(),
        ]);
    }

    builder
}

fn line_promotion_rows(settlement: &Settlement<'_>) -> Builder {
    let mut builder = Builder::default();

    builder.push_record(["Line Promotion", "Name", "Saved"]);

    for adjust in settlement.line_pricing.adjusts() {
        builder.push_record([
            adjust.promotion_id.clone(),
            adjust.name.clone(),
            savings(adjust.discount),
        ]);
    }

    builder
}

fn promotion_rows(settlement: &Settlement<'_>) -> Builder {
    let mut builder = Builder::default();

    builder.push_record(["Rule", "Name", "Base", "Reduction", "Price", "Status"]);

    for detail in settlement.promotion.details() {
        builder.push_record([
            detail.rule_id.clone(),
            detail.rule_name.clone(),
            detail.base_price.to_string(),
            savings(detail.reduction),
            detail.calculated_price.to_string(),
            if detail.valid { "applied" } else { "rolled back" }.to_string(),
        ]);
    }

    builder
}

fn coupon_rows(coupons: &[&CheckedCoupon<'_>]) -> Builder {
    let mut builder = Builder::default();

    builder.push_record(["Coupon", "Category", "Face Value", "Deducted", "Status"]);

    for coupon in coupons {
        builder.push_record([
            coupon.coupon_no.clone(),
            coupon.category.to_string(),
            coupon.face_value.to_string(),
            if coupon.checked {
                savings(coupon.actual_discount)
            } else {
                String::new()
            },
            coupon.status.label().to_string(),
        ]);
    }

    builder
}

fn write_table(
    out: &mut impl io::Write,
    builder: Builder,
    money_columns: Columns<Range<usize>>,
) -> Result<(), ReceiptError> {
    let mut table = builder.build();

    table.with(Theme::from(Style::modern_rounded()));
    table.modify(Rows::first(), Color::BOLD);
    table.modify(money_columns, Alignment::right());

    let table_str = dim_borders(&table.to_string());

    writeln!(out, "\n{table_str}").map_err(|_err| ReceiptError::IO)
}

fn write_summary(
    out: &mut impl io::Write,
    settlement: &Settlement<'_>,
) -> Result<(), ReceiptError> {
    let total_discount = settlement.total_discount()?;

    let rows = [
        SummaryRow::plain("Subtotal:", settlement.original_price.to_string()),
        SummaryRow::plain("Line promotions:", deduction(settlement.line_discount)),
        SummaryRow::plain("Promotions:", deduction(settlement.promotion_discount)),
        SummaryRow::plain("Goods coupons:", deduction(settlement.goods_discount)),
        SummaryRow::plain("Freight:", settlement.freight_after.to_string()),
        SummaryRow::plain("Shipping coupons:", deduction(settlement.shipping_discount)),
        SummaryRow::bold("Total:", settlement.total_pay.to_string()),
        SummaryRow::plain("Savings:", total_discount.to_string()),
    ];

    let label_width = column_width(rows.iter().map(|row| row.label));
    let value_width = column_width(rows.iter().map(|row| row.value.as_str()));

    for row in &rows {
        row.write(out, label_width, value_width)?;
    }

    writeln!(out).map_err(|_err| ReceiptError::IO)
}

fn savings(amount: Money<'_, Currency>) -> String {
    if amount.to_minor_units() == 0 {
        String::new()
    } else {
        deduction(amount)
    }
}

fn deduction(amount: Money<'_, Currency>) -> String {
    format!("-{amount}")
}

fn column_width<'s>(cells: impl Iterator<Item = &'s str>) -> usize {
    cells.map(|cell| cell.chars().count()).max().unwrap_or(0)
}

/// Dims each run of box-drawing characters.
fn dim_borders(table: &str) -> String {
    let mut out = String::with_capacity(table.len() + 256);
    let mut rest = table;

    while let Some(start) = rest.find(|ch: char| BORDER_CHARS.contains(&ch)) {
        let (text, tail) = rest.split_at(start);
        let end = tail
            .find(|ch: char| !BORDER_CHARS.contains(&ch))
            .unwrap_or(tail.len());
        let (border, after) = tail.split_at(end);

        out.push_str(text);
        out.push_str(DIM);
        out.push_str(border);
        out.push_str(RESET);

        rest = after;
    }

    out.push_str(rest);
    out
}

/// One label and amount in the payment summary.
struct SummaryRow {
    label: &'static str,
    value: String,
    bold: bool,
}

impl SummaryRow {
    fn plain(label: &'static str, value: String) -> Self {
        SummaryRow {
            label,
            value,
            bold: false,
        }
    }

    fn bold(label: &'static str, value: String) -> Self {
        SummaryRow {
            label,
            value,
            bold: true,
        }
    }

    /// Right-aligns the label and the value in their columns.
    fn write(
        &self,
        out: &mut impl io::Write,
        label_width: usize,
        value_width: usize,
    ) -> Result<(), ReceiptError> {
        let (open, close) = if self.bold { (BOLD, RESET) } else { ("", "") };

        writeln!(
            out,
            " {open}{label:>label_width$}  {value:>value_width$}{close}",
            label = self.label,
            value = self.value,
        )
        .map_err(|_err| ReceiptError::IO)
    }
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;
    use rusty_money::iso::CNY;
    use testresult::TestResult;

    use crate::{
        cart::{Cart, CartLine},
        coupons::{Coupon, CouponCategory, CouponStatus},
        engines::EngineKind,
        freight::StepFreight,
        line_promotions::LinePromotion,
        rules::{Rule, RuleKind, catalog::RuleCatalog},
        settlement::{OrderOrchestrator, OrderRequest},
    };

    use super::*;

    fn cny(minor: i64) -> Money<'static, Currency> {
        Money::from_minor(minor, CNY)
    }

    fn render(engine: EngineKind) -> Result<String, Box<dyn std::error::Error>> {
        let cart = Cart::with_lines(
            [
                CartLine::new("TEA", cny(3_000), 2),
                CartLine::new("CUP", cny(1_500), 1),
            ],
            CNY,
        )?;
        let tea = LinePromotion::single("TEA2", "Tea 2 off each", RuleKind::AmountOff(cny(200)))
            .with_sku_scope(["TEA"]);
        let line_promotions = [tea];
        let catalog = RuleCatalog::new([Rule::new(
            "R1",
            "Ten off over 60",
            RuleKind::ThresholdAmountOff {
                threshold: cny(6_000),
                amount: cny(1_000),
            },
            1,
        )])?;
        let coupons = [
            Coupon::new("G1", CouponCategory::Goods, cny(500)),
            Coupon::new("S1", CouponCategory::Shipping, cny(300))
                .with_threshold(cny(10_000)),
        ];
        let now: Timestamp = "2026-01-01T00:00:00Z".parse()?;

        let orchestrator = OrderOrchestrator::new(engine, StepFreight::new(cny(9_900), cny(800))?);
        let request = OrderRequest::new(&cart, &catalog, &coupons, now)
            .with_line_promotions(&line_promotions);
        let settlement = orchestrator.settle(&request)?;

        let mut out = Vec::new();
        write_settlement(&mut out, &settlement)?;

        Ok(String::from_utf8(out)?)
    }

    #[test]
    fn receipt_lists_lines_promotions_and_coupons() -> TestResult {
        let receipt = render(EngineKind::Exhaustive)?;

        for needle in [
            "TEA",
            "CUP",
            "TEA2",
            "Tea 2 off each",
            "R1",
            "Ten off over 60",
            "G1",
            "S1",
            "Line promotions:",
            "Total:",
            "Savings:",
        ] {
            assert!(receipt.contains(needle), "receipt should mention {needle}");
        }

        Ok(())
    }

    #[test]
    fn receipt_shows_coupon_status_labels() -> TestResult {
        let receipt = render(EngineKind::Exhaustive)?;
        let selected = CouponStatus::Selected.label();
        let below = CouponStatus::BelowThreshold.label();

        assert!(receipt.contains(selected), "G1 is selected");
        assert!(receipt.contains(below), "S1 misses its threshold");

        Ok(())
    }

    #[test]
    fn summary_rows_align_right() -> TestResult {
        let fee = SummaryRow::plain("Fee:", "1.00".to_string());
        let total = SummaryRow::bold("Total:", "9".to_string());

        let mut out = Vec::new();
        fee.write(&mut out, 6, 5)?;
        total.write(&mut out, 6, 1)?;

        assert_eq!(
            String::from_utf8(out)?,
            "   Fee:   1.00\n \x1b[1mTotal:  9\x1b[0m\n"
        );

        Ok(())
    }

    #[test]
    fn dim_borders_wraps_box_runs() {
        let dimmed = "\x1b[90m│\x1b[0ma\x1b[90m──│\x1b[0m";

        assert_eq!(dim_borders("│a──│"), dimmed);
        assert_eq!(dim_borders("plain"), "plain");
    }
}
