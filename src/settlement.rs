//! Settlement
//!
//! Runs a cart through line promotions, order promotions, goods coupons, freight and shipping
//! coupons, in that order.
//!
//! Goods coupons can take the payable goods amount back under the free-shipping threshold, so
//! freight is computed again after them and shipping coupons are selected against the new freight.

use jiff::Timestamp;
use rust_decimal::Decimal;
use rusty_money::{Money, MoneyError, iso::Currency};
use thiserror::Error;
use tracing::debug;

use crate::{
    allocation::{AllocationError, allocate},
    cart::Cart,
    coupons::{
        Coupon, CouponCategory,
        selector::{CouponSelection, CouponSelector, SelectionContext},
    },
    engines::{EngineError, Evaluation, ExhaustiveEngine, PromotionEngine},
    freight::{FreightCalculator, FreightError, StepFreight},
    line_promotions::{LinePricing, LinePromotion, LinePromotionError, LowestPriceEngine},
    pricing::{ensure_currency, saturating_sub},
    rules::catalog::RuleCatalog,
};

/// Errors raised while settling an order.
#[derive(Debug, Error, PartialEq)]
pub enum SettlementError {
    /// Line promotions could not be priced.
    #[error(transparent)]
    LinePromotion(#[from] LinePromotionError),

    /// The promotion engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Freight could not be calculated.
    #[error(transparent)]
    Freight(#[from] FreightError),

    /// Money arithmetic or currency mismatch error.
    #[error(transparent)]
    Money(#[from] MoneyError),

    /// Discounts could not be spread across the cart lines.
    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

/// Everything needed to settle one order.
#[derive(Debug, Clone, Copy)]
pub struct OrderRequest<'r, 'a> {
    /// Cart being settled
    pub cart: &'r Cart<'a>,

    /// SKU-scoped promotions priced before the order rules
    pub line_promotions: &'r [LinePromotion<'a>],

    /// Order promotion rules
    pub rules: &'r RuleCatalog<'a>,

    /// Coupons held by the customer, of both categories
    pub coupons: &'r [Coupon<'a>],

    /// Evaluation time for coupon expiry
    pub now: Timestamp,

    /// Freight quoted before coupons, if the caller already has one
    pub supplied_freight: Option<Money<'a, Currency>>,
}

impl<'r, 'a> OrderRequest<'r, 'a> {
    /// Create a request with no line promotions and no supplied freight.
    #[must_use]
    pub fn new(
        cart: &'r Cart<'a>,
        rules: &'r RuleCatalog<'a>,
        coupons: &'r [Coupon<'a>],
        now: Timestamp,
    ) -> Self {
        OrderRequest {
            cart,
            line_promotions: &[],
            rules,
            coupons,
            now,
            supplied_freight: None,
        }
    }

    /// Price `promotions` against the cart lines before the order rules.
    #[must_use]
    pub fn with_line_promotions(mut self, promotions: &'r [LinePromotion<'a>]) -> Self {
        self.line_promotions = promotions;
        self
    }

    /// Use `freight` as the freight before coupons instead of calculating it.
    #[must_use]
    pub fn with_supplied_freight(mut self, freight: Money<'a, Currency>) -> Self {
        self.supplied_freight = Some(freight);
        self
    }
}

/// How one cart line shares in the order's goods discounts.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSettlement<'a> {
    /// SKU of the line
    pub sku: String,

    /// Unit price multiplied by quantity
    pub line_total: Money<'a, Currency>,

    /// Discount from the line's own promotion
    pub line_discount: Money<'a, Currency>,

    /// Share of the order promotion discount
    pub promotion_share: Money<'a, Currency>,

    /// Share of the goods coupon discount
    pub coupon_share: Money<'a, Currency>,

    /// Amount payable for the line
    pub pay: Money<'a, Currency>,
}

/// Fully settled order.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement<'a> {
    /// Name of the promotion engine used
    pub engine: &'static str,

    /// Cart subtotal
    pub original_price: Money<'a, Currency>,

    /// Line promotion pricing
    pub line_pricing: LinePricing<'a>,

    /// Discount from line promotions
    pub line_discount: Money<'a, Currency>,

    /// Order promotion evaluation against the line-promoted price
    pub promotion: Evaluation<'a>,

    /// Discount from order promotion rules
    pub promotion_discount: Money<'a, Currency>,

    /// Goods amount after line and order promotions
    pub price_after_promotion: Money<'a, Currency>,

    /// Goods coupon selection against the promoted price
    pub goods_coupons: CouponSelection<'a>,

    /// Discount from goods coupons
    pub goods_discount: Money<'a, Currency>,

    /// Goods amount payable
    pub goods_pay: Money<'a, Currency>,

    /// Freight before goods coupons (supplied or calculated on the promoted price)
    pub freight_before: Money<'a, Currency>,

    /// Freight on the payable goods amount; the freight actually charged
    pub freight_after: Money<'a, Currency>,

    /// Shipping coupon selection against `freight_before`, for display
    pub shipping_coupons_before: CouponSelection<'a>,

    /// Shipping coupon selection against `freight_after`
    pub shipping_coupons: CouponSelection<'a>,

    /// Discount from shipping coupons
    pub shipping_discount: Money<'a, Currency>,

    /// Freight payable
    pub shipping_pay: Money<'a, Currency>,

    /// Goods plus freight payable
    pub total_pay: Money<'a, Currency>,

    /// Per-line share of the goods discounts
    pub lines: Vec<LineSettlement<'a>>,
}

impl<'a> Settlement<'a> {
    /// Line promotion, order promotion, goods coupon and shipping coupon discounts combined.
    ///
    /// # Errors
    ///
    /// Returns a [`MoneyError`] if the currencies differ.
    pub fn total_discount(&self) -> Result<Money<'a, Currency>, MoneyError> {
        self.line_discount
            .add(self.promotion_discount)?
            .add(self.goods_discount)?
            .add(self.shipping_discount)
    }

    /// Numbers of every coupon used, goods first.
    pub fn checked_coupon_numbers(&self) -> impl Iterator<Item = &str> {
        self.goods_coupons
            .checked()
            .chain(self.shipping_coupons.checked())
            .map(|coupon| coupon.coupon_no.as_str())
    }
}

/// Sequences promotion, coupon and freight calculation for an order.
#[derive(Debug, Clone)]
pub struct OrderOrchestrator<E = ExhaustiveEngine, F = StepFreight<'static>> {
    engine: E,
    freight: F,
    selector: CouponSelector,
    line_engine: LowestPriceEngine,
}

impl<E, F> OrderOrchestrator<E, F> {
    /// Create an orchestrator with the default coupon selector and line promotion engine.
    pub fn new(engine: E, freight: F) -> Self {
        OrderOrchestrator {
            engine,
            freight,
            selector: CouponSelector::default(),
            line_engine: LowestPriceEngine::default(),
        }
    }

    /// Replace the coupon selector.
    #[must_use]
    pub fn with_selector(mut self, selector: CouponSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Replace the line promotion engine.
    #[must_use]
    pub fn with_line_engine(mut self, line_engine: LowestPriceEngine) -> Self {
        self.line_engine = line_engine;
        self
    }

    /// Promotion engine
    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Freight calculator
    #[must_use]
    pub fn freight(&self) -> &F {
        &self.freight
    }

    /// Coupon selector
    #[must_use]
    pub fn selector(&self) -> &CouponSelector {
        &self.selector
    }

    /// Line promotion engine
    #[must_use]
    pub fn line_engine(&self) -> &LowestPriceEngine {
        &self.line_engine
    }
}

impl<E: PromotionEngine, F> OrderOrchestrator<E, F> {
    /// Settle an order.
    ///
    /// # Errors
    ///
    /// Returns a [`SettlementError`] if line promotions or the promotion engine fail, freight
    /// cannot be calculated, or any amount is in a different currency from the cart.
    #[tracing::instrument(
        name = "settlement.settle",
        skip_all,
        fields(
            engine = self.engine.name(),
            lines = request.cart.len(),
            coupons = request.coupons.len(),
            total_pay = tracing::field::Empty
        ),
        err
    )]
    pub fn settle<'a>(
        &self,
        request: &OrderRequest<'_, 'a>,
    ) -> Result<Settlement<'a>, SettlementError>
    where
        F: FreightCalculator<'a>,
    {
        let cart = request.cart;
        let original_price = cart.subtotal();

        let line_pricing = self.line_engine.price(cart, request.line_promotions)?;
        let line_discount = line_pricing.discount();

        let promotion = self.engine.evaluate(line_pricing.promoted(), request.rules)?;
        let promotion_discount = promotion.total_discount();
        let price_after_promotion = promotion.pay_price()?;

        debug!(
            original = original_price.to_minor_units(),
            line_discount = line_discount.to_minor_units(),
            discount = promotion_discount.to_minor_units(),
            rules = promotion.details().len(),
            "applied promotions"
        );

        let goods_context = SelectionContext::new(request.now).with_skus(cart.skus());

        let goods_coupons = self.selector.select(
            CouponCategory::Goods,
            price_after_promotion,
            request.coupons,
            &goods_context,
        );
        let goods_discount = goods_coupons.total_discount();
        let goods_pay = saturating_sub(price_after_promotion, goods_discount)?;

        let freight_before = match request.supplied_freight {
            Some(supplied) => {
                ensure_currency(&supplied, cart.currency())?;
                supplied
            }
            None => self.freight.freight(price_after_promotion)?,
        };
        let freight_after = self.freight.freight(goods_pay)?;

        debug!(
            goods_pay = goods_pay.to_minor_units(),
            freight_before = freight_before.to_minor_units(),
            freight_after = freight_after.to_minor_units(),
            "calculated freight"
        );

        let shipping_context =
            SelectionContext::new(request.now).reserving(goods_coupons.used_groups());

        let shipping_coupons_before = self.selector.select(
            CouponCategory::Shipping,
            freight_before,
            request.coupons,
            &shipping_context,
        );
        let shipping_coupons = self.selector.select(
            CouponCategory::Shipping,
            freight_after,
            request.coupons,
            &shipping_context,
        );

        let shipping_discount = shipping_coupons.total_discount();
        let shipping_pay = saturating_sub(freight_after, shipping_discount)?;
        let total_pay = goods_pay.add(shipping_pay)?;

        let lines = line_breakdown(&line_pricing, promotion_discount, goods_discount)?;

        tracing::Span::current().record("total_pay", total_pay.to_minor_units());

        Ok(Settlement {
            engine: self.engine.name(),
            original_price,
            line_pricing,
            line_discount,
            promotion,
            promotion_discount,
            price_after_promotion,
            goods_coupons,
            goods_discount,
            goods_pay,
            freight_before,
            freight_after,
            shipping_coupons_before,
            shipping_coupons,
            shipping_discount,
            shipping_pay,
            total_pay,
            lines,
        })
    }
}

/// Spread the order promotion discount over the line-promoted totals, then the coupon discount
/// over what is left.
fn line_breakdown<'a>(
    line_pricing: &LinePricing<'a>,
    promotion_discount: Money<'a, Currency>,
    coupon_discount: Money<'a, Currency>,
) -> Result<Vec<LineSettlement<'a>>, SettlementError> {
    let priced = line_pricing.lines();

    let promotion_shares = allocate(
        promotion_discount,
        priced
            .iter()
            .map(|line| ((), Decimal::from(line.promoted_total.to_minor_units()))),
    )?;

    let promoted: Vec<Money<'a, Currency>> = priced
        .iter()
        .zip(&promotion_shares)
        .map(|(line, (_, share))| saturating_sub(line.promoted_total, *share))
        .collect::<Result<_, _>>()?;

    let coupon_shares = allocate(
        coupon_discount,
        promoted
            .iter()
            .map(|price| ((), Decimal::from(price.to_minor_units()))),
    )?;

    let mut lines = Vec::with_capacity(priced.len());

    for (((line, promoted), (_, promotion_share)), (_, coupon_share)) in priced
        .iter()
        .zip(promoted)
        .zip(promotion_shares)
        .zip(coupon_shares)
    {
        lines.push(LineSettlement {
            sku: line.sku.clone(),
            line_total: line.line_total,
            line_discount: line.discount,
            promotion_share,
            coupon_share,
            pay: saturating_sub(promoted, coupon_share)?,
        });
    }

    Ok(lines)
}
