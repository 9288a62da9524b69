use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::cart::Sku;
use crate::domain::coupon::{CouponCode, DiscountType};

/// One coupon's discount against one cart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountResult {
    pub applied_code: CouponCode,
    pub discount_type: DiscountType,
    pub discount_amount: Decimal,
    pub per_line_discounts: BTreeMap<Sku, Decimal>,
}

impl DiscountResult {
    pub fn zero(applied_code: CouponCode, discount_type: DiscountType) -> Self {
        Self {
            applied_code,
            discount_type,
            discount_amount: Decimal::ZERO,
            per_line_discounts: BTreeMap::new(),
        }
    }

    /// Discount allocated to `sku`; lines the coupon did not touch get zero.
    pub fn discount_for(&self, sku: &Sku) -> Decimal {
        self.per_line_discounts.get(sku).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn allocated_total(&self) -> Decimal {
        self.per_line_discounts.values().copied().sum()
    }

    pub fn is_zero(&self) -> bool {
        self.discount_amount.is_zero()
    }

    pub fn to_record(&self, description: Option<&str>) -> AppliedCouponRecord {
        AppliedCouponRecord {
            code: self.applied_code.clone(),
            discount_amount: self.discount_amount,
            discount_type: self.discount_type,
            description: description.map(str::to_owned),
        }
    }

    /// SHA-256 of the canonical JSON form; re-running the engine on the same
    /// inputs must reproduce it.
    pub fn fingerprint(&self) -> String {
        canonical_fingerprint(self, self.applied_code.as_str())
    }
}

/// Immutable snapshot persisted on a finalized order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCouponRecord {
    pub code: CouponCode,
    pub discount_amount: Decimal,
    pub discount_type: DiscountType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub(crate) fn canonical_fingerprint<T: Serialize>(value: &T, fallback: &str) -> String {
    let payload = match serde_json::to_vec(value) {
        Ok(payload) => payload,
        Err(_) => fallback.as_bytes().to_vec(),
    };
    let digest = Sha256::digest(&payload);
    let mut output = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}
