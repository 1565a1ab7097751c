//! Pricewise
//!
//! Pricewise is a promotion and coupon settlement engine. It prices SKU-scoped line promotions,
//! picks the best legal combination of order promotion rules, deducts goods coupons, works out
//! freight and deducts shipping coupons, then spreads the discounts back over the cart lines.

pub mod allocation;
pub mod cart;
pub mod config;
pub mod coupons;
pub mod discounts;
pub mod engines;
pub mod freight;
pub mod line_promotions;
pub mod prelude;
pub mod pricing;
pub mod receipt;
pub mod rules;
pub mod settlement;
