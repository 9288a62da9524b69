use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::cart::Sku;
use crate::errors::CouponDefinitionError;

/// Coupon codes are unique case-insensitively and always stored upper-case.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CouponCode(String);

impl CouponCode {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CouponCode {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for CouponCode {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<CouponCode> for String {
    fn from(value: CouponCode) -> Self {
        value.0
    }
}

impl std::fmt::Display for CouponCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    PercentAll,
    PercentSpecific,
    Fixed,
    Bogo,
}

impl DiscountType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PercentAll => "percent_all",
            Self::PercentSpecific => "percent_specific",
            Self::Fixed => "fixed",
            Self::Bogo => "bogo",
        }
    }
}

impl std::fmt::Display for DiscountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a coupon takes off. Each variant carries only the fields it uses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscountKind {
    PercentAll {
        percent: Decimal,
    },
    PercentSpecific {
        percent: Decimal,
        /// Flattened SKU allow-list. Categories are expanded into it by the caller.
        #[serde(default)]
        eligible_products: BTreeSet<Sku>,
        #[serde(default)]
        eligible_categories: BTreeSet<String>,
    },
    Fixed {
        amount: Decimal,
    },
    Bogo {
        percent: Decimal,
        buy_quantity: u32,
        get_quantity: u32,
        #[serde(default)]
        eligible_skus: BTreeSet<Sku>,
    },
}

impl DiscountKind {
    pub fn discount_type(&self) -> DiscountType {
        match self {
            Self::PercentAll { .. } => DiscountType::PercentAll,
            Self::PercentSpecific { .. } => DiscountType::PercentSpecific,
            Self::Fixed { .. } => DiscountType::Fixed,
            Self::Bogo { .. } => DiscountType::Bogo,
        }
    }

    /// The raw discount value: a percentage for percent and BOGO kinds, a currency
    /// amount for fixed coupons.
    pub fn value(&self) -> Decimal {
        match self {
            Self::PercentAll { percent }
            | Self::PercentSpecific { percent, .. }
            | Self::Bogo { percent, .. } => *percent,
            Self::Fixed { amount } => *amount,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponDefinition {
    pub code: CouponCode,
    pub kind: DiscountKind,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub min_cart_value: Option<Decimal>,
    /// Inclusive lower bound; `None` is unbounded.
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    /// Inclusive upper bound; `None` is unbounded.
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub usage_limit: Option<u32>,
    #[serde(default)]
    pub usage_limit_per_user: Option<u32>,
    #[serde(default)]
    pub stackable: bool,
    #[serde(default)]
    pub auto_apply: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl CouponDefinition {
    pub fn new(code: impl AsRef<str>, kind: DiscountKind) -> Self {
        Self {
            code: CouponCode::new(code),
            kind,
            description: None,
            min_cart_value: None,
            starts_at: None,
            ends_at: None,
            usage_limit: None,
            usage_limit_per_user: None,
            stackable: false,
            auto_apply: false,
            is_active: true,
        }
    }

    pub fn discount_type(&self) -> DiscountType {
        self.kind.discount_type()
    }

    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        let started = self.starts_at.map_or(true, |starts_at| now >= starts_at);
        let not_ended = self.ends_at.map_or(true, |ends_at| now <= ends_at);
        started && not_ended
    }

    /// Deactivates the coupon once its end date has passed. Never reactivates.
    /// Returns whether the flag changed.
    pub fn refresh_activity(&mut self, now: DateTime<Utc>) -> bool {
        match self.ends_at {
            Some(ends_at) if self.is_active && now > ends_at => {
                self.is_active = false;
                true
            }
            _ => false,
        }
    }

    /// Creation-time contract for a stored coupon.
    pub fn validate(&self) -> Result<(), CouponDefinitionError> {
        let code = self.code.as_str().to_owned();
        if code.is_empty() {
            return Err(CouponDefinitionError::EmptyCode);
        }

        match &self.kind {
            DiscountKind::PercentAll { percent }
            | DiscountKind::PercentSpecific { percent, .. }
            | DiscountKind::Bogo { percent, .. } => {
                if *percent <= Decimal::ZERO {
                    return Err(CouponDefinitionError::NonPositiveDiscountValue {
                        code,
                        value: *percent,
                    });
                }
                if *percent > Decimal::ONE_HUNDRED {
                    return Err(CouponDefinitionError::PercentageOutOfRange {
                        code,
                        value: *percent,
                    });
                }
            }
            DiscountKind::Fixed { amount } => {
                if *amount <= Decimal::ZERO {
                    return Err(CouponDefinitionError::NonPositiveDiscountValue {
                        code,
                        value: *amount,
                    });
                }
            }
        }

        if let DiscountKind::Bogo { buy_quantity, get_quantity, .. } = &self.kind {
            check_bogo_quantity(&code, "buy", i64::from(*buy_quantity))?;
            check_bogo_quantity(&code, "get", i64::from(*get_quantity))?;
        }

        if let Some(min_cart_value) = self.min_cart_value {
            if min_cart_value < Decimal::ZERO {
                return Err(CouponDefinitionError::NegativeMinimumCartValue {
                    code,
                    value: min_cart_value,
                });
            }
        }

        if let (Some(starts_at), Some(ends_at)) = (self.starts_at, self.ends_at) {
            if starts_at > ends_at {
                return Err(CouponDefinitionError::InvertedValidityWindow { code });
            }
        }

        Ok(())
    }
}

fn check_bogo_quantity(
    code: &str,
    field: &'static str,
    value: i64,
) -> Result<(), CouponDefinitionError> {
    if value < 1 {
        return Err(CouponDefinitionError::BogoQuantityBelowOne {
            code: code.to_owned(),
            field,
            value,
        });
    }
    Ok(())
}

/// Loosely-typed coupon input as it arrives from the admin surface. `build`
/// applies the creation-time defaults and contracts and produces a
/// [`CouponDefinition`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponDraft {
    pub code: String,
    pub discount_type: Option<DiscountType>,
    #[serde(default)]
    pub discount_value: Option<Decimal>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub min_cart_value: Option<Decimal>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub usage_limit: Option<u32>,
    #[serde(default)]
    pub usage_limit_per_user: Option<u32>,
    #[serde(default)]
    pub stackable: bool,
    #[serde(default)]
    pub auto_apply: bool,
    #[serde(default)]
    pub eligible_products: Vec<String>,
    #[serde(default)]
    pub eligible_categories: Vec<String>,
    #[serde(default)]
    pub bogo_buy_quantity: Option<i64>,
    #[serde(default)]
    pub bogo_get_quantity: Option<i64>,
    #[serde(default)]
    pub bogo_eligible_skus: Vec<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

const BOGO_DEFAULT_PERCENT: Decimal = Decimal::ONE_HUNDRED;
const BOGO_DEFAULT_QUANTITY: i64 = 1;

impl CouponDraft {
    pub fn build(self) -> Result<CouponDefinition, CouponDefinitionError> {
        let code = CouponCode::new(&self.code);
        if code.as_str().is_empty() {
            return Err(CouponDefinitionError::EmptyCode);
        }

        let discount_type = self.discount_type.unwrap_or(DiscountType::PercentAll);
        let required_value = || {
            self.discount_value.ok_or_else(|| CouponDefinitionError::MissingDiscountValue {
                code: code.as_str().to_owned(),
            })
        };

        let kind = match discount_type {
            DiscountType::PercentAll => DiscountKind::PercentAll { percent: required_value()? },
            DiscountType::PercentSpecific => DiscountKind::PercentSpecific {
                percent: required_value()?,
                eligible_products: self.eligible_products.iter().map(Sku::new).collect(),
                eligible_categories: self.eligible_categories.iter().cloned().collect(),
            },
            DiscountType::Fixed => DiscountKind::Fixed { amount: required_value()? },
            DiscountType::Bogo => {
                let buy = self.bogo_buy_quantity.unwrap_or(BOGO_DEFAULT_QUANTITY);
                let get = self.bogo_get_quantity.unwrap_or(BOGO_DEFAULT_QUANTITY);
                check_bogo_quantity(code.as_str(), "buy", buy)?;
                check_bogo_quantity(code.as_str(), "get", get)?;
                DiscountKind::Bogo {
                    percent: self.discount_value.unwrap_or(BOGO_DEFAULT_PERCENT),
                    buy_quantity: clamp_quantity(buy),
                    get_quantity: clamp_quantity(get),
                    eligible_skus: self.bogo_eligible_skus.iter().map(Sku::new).collect(),
                }
            }
        };

        let definition = CouponDefinition {
            code,
            kind,
            description: self.description,
            min_cart_value: self.min_cart_value,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            usage_limit: self.usage_limit,
            usage_limit_per_user: self.usage_limit_per_user,
            stackable: self.stackable,
            auto_apply: self.auto_apply,
            is_active: self.is_active.unwrap_or(true),
        };
        definition.validate()?;
        Ok(definition)
    }
}

fn clamp_quantity(value: i64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Coupons keyed by canonical code, kept in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CouponCatalog {
    coupons: Vec<CouponDefinition>,
}

impl CouponCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, coupon: CouponDefinition) -> Result<(), CouponDefinitionError> {
        coupon.validate()?;
        if self.get(&coupon.code).is_some() {
            return Err(CouponDefinitionError::DuplicateCode {
                code: coupon.code.as_str().to_owned(),
            });
        }
        self.coupons.push(coupon);
        Ok(())
    }

    pub fn get(&self, code: &CouponCode) -> Option<&CouponDefinition> {
        self.coupons.iter().find(|coupon| &coupon.code == code)
    }

    pub fn coupons(&self) -> &[CouponDefinition] {
        &self.coupons
    }

    pub fn len(&self) -> usize {
        self.coupons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coupons.is_empty()
    }

    /// Applies the end-date deactivation to every coupon; returns the codes that
    /// were switched off.
    pub fn refresh_activity(&mut self, now: DateTime<Utc>) -> Vec<CouponCode> {
        self.coupons
            .iter_mut()
            .filter_map(|coupon| coupon.refresh_activity(now).then(|| coupon.code.clone()))
            .collect()
    }

    pub fn auto_apply_candidates(&self, now: DateTime<Utc>) -> Vec<&CouponDefinition> {
        auto_apply_candidates(&self.coupons, now)
    }
}

/// Active, in-window coupons flagged for automatic application, in catalog order.
pub fn auto_apply_candidates(
    coupons: &[CouponDefinition],
    now: DateTime<Utc>,
) -> Vec<&CouponDefinition> {
    coupons
        .iter()
        .filter(|coupon| coupon.auto_apply && coupon.is_active && coupon.is_within_window(now))
        .collect()
}
