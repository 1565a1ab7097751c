//! Scenario Configuration
//!
//! Loads a cart, its line promotions and order rules, the customer's coupons and the freight
//! settings from a single YAML document.

use std::{fs, path::Path};

use jiff::Timestamp;
use rusty_money::{Money, iso::Currency};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    cart::{Cart, CartError, CartLine},
    coupons::{
        Coupon, CouponCategory,
        selector::{CouponSelector, DEFAULT_MAX_TEMPLATES},
    },
    engines::EngineKind,
    freight::{FreightError, StepFreight},
    line_promotions::{
        DEFAULT_MAX_ENUMERATIONS, LinePromotion, LinePromotionError, LowestPriceEngine,
        PromotionLevel,
    },
    rules::{
        Rule, RuleKind,
        catalog::{CatalogError, DEFAULT_MAX_RULES, RuleCatalog},
    },
    settlement::{OrderOrchestrator, OrderRequest, Settlement, SettlementError},
};

pub mod prices;

use prices::{parse_currency, parse_price_in, parse_rate};

/// Configuration Errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading a scenario file
    #[error("Failed to read scenario file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// Invalid price format
    #[error("Invalid price format: {0}")]
    InvalidPrice(String),

    /// Invalid rate format
    #[error("Invalid rate format: {0}")]
    InvalidRate(String),

    /// Unknown currency code
    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),

    /// A price is not in the scenario currency
    #[error("Currency mismatch: expected {0}, found {1}")]
    CurrencyMismatch(String, String),

    /// Cart lines are invalid
    #[error("Invalid cart: {0}")]
    Cart(#[from] CartError),

    /// Rules are invalid
    #[error("Invalid rules: {0}")]
    Catalog(#[from] CatalogError),

    /// A line promotion is invalid
    #[error("Invalid line promotion: {0}")]
    LinePromotion(#[from] LinePromotionError),

    /// Freight settings are invalid
    #[error("Invalid freight settings: {0}")]
    Freight(#[from] FreightError),

    /// Settling the loaded scenario failed
    #[error("Settlement failed: {0}")]
    Settlement(#[from] SettlementError),
}

/// Scenario document as written in YAML
#[derive(Debug, Deserialize)]
pub struct ScenarioFile {
    /// Order-wide settings
    pub settings: SettingsFile,

    /// Evaluation time, defaults to the time of loading
    #[serde(default)]
    pub now: Option<Timestamp>,

    /// Freight already quoted for this order
    #[serde(default)]
    pub supplied_freight: Option<String>,

    /// Cart lines
    pub cart: Vec<LineFile>,

    /// SKU-scoped promotions
    #[serde(default)]
    pub line_promotions: Vec<LinePromotionFile>,

    /// Order promotion rules
    #[serde(default)]
    pub rules: Vec<RuleFile>,

    /// Coupons held by the customer
    #[serde(default)]
    pub coupons: Vec<CouponFile>,
}

/// Order-wide settings
#[derive(Debug, Deserialize)]
pub struct SettingsFile {
    /// ISO currency code every price must use
    pub currency: String,

    /// Goods amount from which shipping is free, e.g. "199.00 CNY"
    pub free_shipping_threshold: String,

    /// Freight charged below the threshold
    pub base_freight: String,

    /// Coupons selected per category
    #[serde(default = "default_max_coupons")]
    pub max_coupons: usize,

    /// Distinct coupon templates selected per category
    #[serde(default = "default_max_templates")]
    pub max_templates: usize,

    /// Line promotion assignments scored before falling back to single promotions
    #[serde(default = "default_max_enumerations")]
    pub max_enumerations: u64,

    /// Catalog size limit
    #[serde(default = "default_max_rules")]
    pub max_rules: usize,

    /// Promotion engine
    #[serde(default)]
    pub engine: EngineKind,
}

fn default_max_coupons() -> usize {
    CouponSelector::default().max_coupons()
}

fn default_max_templates() -> usize {
    DEFAULT_MAX_TEMPLATES
}

fn default_max_enumerations() -> u64 {
    DEFAULT_MAX_ENUMERATIONS
}

fn default_max_rules() -> usize {
    DEFAULT_MAX_RULES
}

/// Cart line as written in YAML
#[derive(Debug, Deserialize)]
pub struct LineFile {
    /// SKU
    pub sku: String,

    /// Unit price, e.g. "80.00 CNY"
    pub price: String,

    /// Quantity, defaults to one
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

/// Pricing effect as written in YAML
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KindFile {
    /// Pay-rate discount
    Discount {
        /// Pay rate, "80%" or "0.8"
        rate: String,
    },

    /// Fixed amount off
    AmountOff {
        /// Amount subtracted
        amount: String,
    },

    /// Amount off once the price reaches a threshold
    ThresholdAmountOff {
        /// Minimum price
        threshold: String,

        /// Amount subtracted
        amount: String,
    },
}

impl KindFile {
    /// Convert into a [`RuleKind`] priced in `currency`.
    ///
    /// # Errors
    ///
    /// Returns an error if a rate or amount cannot be parsed or uses another currency.
    pub fn try_into_kind(
        self,
        currency: &'static Currency,
    ) -> Result<RuleKind<'static>, ConfigError> {
        Ok(match self {
            KindFile::Discount { rate } => RuleKind::Discount(parse_rate(&rate)?),
            KindFile::AmountOff { amount } => {
                RuleKind::AmountOff(parse_price_in(&amount, currency)?)
            }
            KindFile::ThresholdAmountOff { threshold, amount } => RuleKind::ThresholdAmountOff {
                threshold: parse_price_in(&threshold, currency)?,
                amount: parse_price_in(&amount, currency)?,
            },
        })
    }
}

/// Order promotion rule as written in YAML
#[derive(Debug, Deserialize)]
pub struct RuleFile {
    /// Rule id
    pub id: String,

    /// Display name
    pub name: String,

    /// Pricing effect, tagged by `type`
    #[serde(flatten)]
    pub kind: KindFile,

    /// Lower runs first
    #[serde(default)]
    pub priority: i32,

    /// Ids of rules this one cannot combine with
    #[serde(default)]
    pub exclusive_with: Vec<String>,
}

impl RuleFile {
    /// Convert into a [`Rule`] priced in `currency`.
    ///
    /// # Errors
    ///
    /// Returns an error if a rate or amount cannot be parsed or uses another currency.
    pub fn try_into_rule(self, currency: &'static Currency) -> Result<Rule<'static>, ConfigError> {
        let kind = self.kind.try_into_kind(currency)?;

        let rule = Rule::new(self.id, self.name, kind, self.priority);

        Ok(rule.exclusive_with(self.exclusive_with))
    }
}

/// SKU-scoped promotion as written in YAML
#[derive(Debug, Deserialize)]
pub struct LinePromotionFile {
    /// Promotion id
    pub id: String,

    /// Display name
    pub name: String,

    /// Single or group, defaults to single
    #[serde(default = "default_level")]
    pub level: PromotionLevel,

    /// Pricing effect, tagged by `type`
    #[serde(flatten)]
    pub kind: KindFile,

    /// SKUs the promotion is limited to; empty means every SKU
    #[serde(default)]
    pub sku_scope: Vec<String>,
}

fn default_level() -> PromotionLevel {
    PromotionLevel::Single
}

impl LinePromotionFile {
    /// Convert into a [`LinePromotion`] priced in `currency`.
    ///
    /// # Errors
    ///
    /// Returns an error if an amount cannot be parsed, uses another currency, or a group
    /// promotion takes an amount off each unit.
    pub fn try_into_promotion(
        self,
        currency: &'static Currency,
    ) -> Result<LinePromotion<'static>, ConfigError> {
        let kind = self.kind.try_into_kind(currency)?;
        let promotion = LinePromotion::new(self.id, self.name, self.level, kind)?;

        Ok(promotion.with_sku_scope(self.sku_scope))
    }
}

/// Coupon as written in YAML
#[derive(Debug, Deserialize)]
pub struct CouponFile {
    /// Coupon number
    pub coupon_no: String,

    /// Goods or shipping
    pub category: CouponCategory,

    /// Face value
    pub face_value: String,

    /// Minimum base amount
    #[serde(default)]
    pub threshold: Option<String>,

    /// SKUs the coupon is limited to; empty means universal
    #[serde(default)]
    pub sku_scope: Vec<String>,

    /// Expiry time
    #[serde(default)]
    pub expires_at: Option<Timestamp>,

    /// Mutual exclusion group
    #[serde(default)]
    pub exclusive_group: Option<String>,

    /// Template the coupon was issued from
    #[serde(default)]
    pub template: Option<String>,
}

impl CouponFile {
    /// Convert into a [`Coupon`] priced in `currency`.
    ///
    /// # Errors
    ///
    /// Returns an error if an amount cannot be parsed or uses another currency.
    pub fn try_into_coupon(
        self,
        currency: &'static Currency,
    ) -> Result<Coupon<'static>, ConfigError> {
        let mut coupon = Coupon::new(
            self.coupon_no,
            self.category,
            parse_price_in(&self.face_value, currency)?,
        )
        .with_sku_scope(self.sku_scope);

        if let Some(threshold) = self.threshold {
            coupon = coupon.with_threshold(parse_price_in(&threshold, currency)?);
        }

        if let Some(expires_at) = self.expires_at {
            coupon = coupon.with_expiry(expires_at);
        }

        if let Some(group) = self.exclusive_group {
            coupon = coupon.with_exclusive_group(group);
        }

        if let Some(template) = self.template {
            coupon = coupon.with_template(template);
        }

        Ok(coupon)
    }
}

/// A fully parsed scenario, ready to settle
#[derive(Debug)]
pub struct Config {
    cart: Cart<'static>,
    line_promotions: Vec<LinePromotion<'static>>,
    catalog: RuleCatalog<'static>,
    coupons: Vec<Coupon<'static>>,
    freight: StepFreight<'static>,
    selector: CouponSelector,
    line_engine: LowestPriceEngine,
    engine: EngineKind,
    now: Timestamp,
    supplied_freight: Option<Money<'static, Currency>>,
}

impl Config {
    /// Parse a scenario from YAML text.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the YAML is malformed or any part of the scenario is invalid.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let file: ScenarioFile = serde_norway::from_str(contents)?;

        Config::try_from(file)
    }

    /// Load a scenario file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;

        Config::from_yaml_str(&contents)
    }

    /// Replace the configured promotion engine.
    #[must_use]
    pub fn with_engine(mut self, engine: EngineKind) -> Self {
        self.engine = engine;
        self
    }

    /// The scenario cart
    pub fn cart(&self) -> &Cart<'static> {
        &self.cart
    }

    /// The scenario line promotions
    pub fn line_promotions(&self) -> &[LinePromotion<'static>] {
        &self.line_promotions
    }

    /// The scenario order rules
    pub fn catalog(&self) -> &RuleCatalog<'static> {
        &self.catalog
    }

    /// The customer's coupons
    pub fn coupons(&self) -> &[Coupon<'static>] {
        &self.coupons
    }

    /// Configured promotion engine
    pub fn engine(&self) -> EngineKind {
        self.engine
    }

    /// Evaluation time
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Build an orchestrator from the settings.
    pub fn orchestrator(&self) -> OrderOrchestrator<EngineKind, StepFreight<'static>> {
        OrderOrchestrator::new(self.engine, self.freight)
            .with_selector(self.selector)
            .with_line_engine(self.line_engine)
    }

    /// Build the order request for this scenario.
    pub fn request(&self) -> OrderRequest<'_, 'static> {
        let request = OrderRequest::new(&self.cart, &self.catalog, &self.coupons, self.now)
            .with_line_promotions(&self.line_promotions);

        match self.supplied_freight {
            Some(freight) => request.with_supplied_freight(freight),
            None => request,
        }
    }

    /// Settle the scenario.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Settlement`] if settlement fails.
    pub fn settle(&self) -> Result<Settlement<'static>, ConfigError> {
        Ok(self.orchestrator().settle(&self.request())?)
    }
}

impl TryFrom<ScenarioFile> for Config {
    type Error = ConfigError;

    fn try_from(file: ScenarioFile) -> Result<Self, Self::Error> {
        let settings = file.settings;
        let currency = parse_currency(&settings.currency)?;

        let lines = file
            .cart
            .into_iter()
            .map(|line| {
                let price = parse_price_in(&line.price, currency)?;

                Ok(CartLine::new(line.sku, price, line.quantity))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let line_promotions = file
            .line_promotions
            .into_iter()
            .map(|promotion| promotion.try_into_promotion(currency))
            .collect::<Result<Vec<_>, _>>()?;

        let rules = file
            .rules
            .into_iter()
            .map(|rule| rule.try_into_rule(currency))
            .collect::<Result<Vec<_>, _>>()?;

        let coupons = file
            .coupons
            .into_iter()
            .map(|coupon| coupon.try_into_coupon(currency))
            .collect::<Result<Vec<_>, _>>()?;

        let freight = StepFreight::new(
            parse_price_in(&settings.free_shipping_threshold, currency)?,
            parse_price_in(&settings.base_freight, currency)?,
        )?;

        let supplied_freight = file
            .supplied_freight
            .map(|freight| parse_price_in(&freight, currency))
            .transpose()?;

        Ok(Config {
            cart: Cart::with_lines(lines, currency)?,
            line_promotions,
            catalog: RuleCatalog::with_limit(rules, settings.max_rules)?,
            coupons,
            freight,
            selector: CouponSelector::new(settings.max_coupons)
                .with_template_limit(settings.max_templates),
            line_engine: LowestPriceEngine::new()
                .with_max_enumerations(settings.max_enumerations),
            engine: settings.engine,
            now: file.now.unwrap_or_else(Timestamp::now),
            supplied_freight,
        })
    }
}
