//! Pricewise prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    allocation::{AllocationError, allocate},
    cart::{Cart, CartError, CartLine},
    config::{Config, ConfigError},
    coupons::{
        CheckedCoupon, Coupon, CouponCategory, CouponStatus,
        selector::{CouponSelection, CouponSelector, SelectionContext},
    },
    discounts::DiscountError,
    engines::{
        EngineError, EngineKind, Evaluation, ExhaustiveEngine, PromotionEngine, RollbackEngine,
        StackingMode,
    },
    freight::{FreightCalculator, FreightError, StepFreight},
    line_promotions::{
        LinePricing, LinePromotion, LinePromotionError, LowestPriceEngine, PricedLine,
        PromotionAdjust, PromotionLevel,
    },
    pricing::TotalPriceError,
    receipt::{ReceiptError, write_settlement},
    rules::{
        Rule, RuleKind, Stage,
        catalog::{CatalogError, RuleCatalog},
        reductions::ReductionDetail,
    },
    settlement::{LineSettlement, OrderOrchestrator, OrderRequest, Settlement, SettlementError},
};
