pub mod aggregate;
pub mod allocation;
pub mod eligibility;
pub mod pricer;
pub mod strategy;
pub mod validity;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::domain::cart::{CartSnapshot, Sku};
use crate::domain::coupon::{CouponCode, CouponDefinition};
use crate::domain::discount::{canonical_fingerprint, AppliedCouponRecord, DiscountResult};
use crate::domain::redemption::RedemptionCounts;

use self::{
    aggregate::aggregate,
    eligibility::EmptyAllowListPolicy,
    pricer::{price_cart, subtotal},
    strategy::resolve,
    validity::{
        AppliedCouponRef, DeterministicValidityPolicy, RejectionReason, ValidationContext,
        ValidityPolicy, ValidityState,
    },
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingPolicy {
    #[default]
    HalfUp,
    HalfEven,
}

/// Numeric policy shared by every algorithm.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    /// Decimal places of the minor currency unit (2 for cents).
    pub minor_unit_scale: u32,
    pub rounding: RoundingPolicy,
    pub empty_bogo_allow_list: EmptyAllowListPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            minor_unit_scale: 2,
            rounding: RoundingPolicy::HalfUp,
            empty_bogo_allow_list: EmptyAllowListPolicy::AllLines,
        }
    }
}

impl EngineSettings {
    pub fn round(&self, value: Decimal) -> Decimal {
        let strategy = match self.rounding {
            RoundingPolicy::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            RoundingPolicy::HalfEven => RoundingStrategy::MidpointNearestEven,
        };
        value.round_dp_with_strategy(self.minor_unit_scale, strategy)
    }

    pub fn truncate(&self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.minor_unit_scale, RoundingStrategy::ToZero)
    }

    /// One minor currency unit, e.g. `0.01` at scale 2.
    pub fn minor_unit(&self) -> Decimal {
        Decimal::new(1, self.minor_unit_scale)
    }
}

/// Everything one checkout or quote call needs. Redemption counts are read by
/// the caller beforehand; missing entries count as zero.
#[derive(Clone, Debug)]
pub struct QuoteRequest<'a> {
    pub cart: &'a CartSnapshot,
    /// Coupons in the order they should be applied.
    pub coupons: &'a [CouponDefinition],
    pub now: DateTime<Utc>,
    pub redemptions: &'a BTreeMap<CouponCode, RedemptionCounts>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CouponOutcome {
    /// The coupon's own result, computed against the original subtotal.
    Applied { result: DiscountResult },
    NotApplicable { reason: RejectionReason },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponApplication {
    pub code: CouponCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub outcome: CouponOutcome,
}

impl CouponApplication {
    pub fn applied_result(&self) -> Option<&DiscountResult> {
        match &self.outcome {
            CouponOutcome::Applied { result } => Some(result),
            CouponOutcome::NotApplicable { .. } => None,
        }
    }

    pub fn rejection(&self) -> Option<&RejectionReason> {
        match &self.outcome {
            CouponOutcome::Applied { .. } => None,
            CouponOutcome::NotApplicable { reason } => Some(reason),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutQuote {
    pub currency: String,
    pub subtotal: Decimal,
    pub total_discount: Decimal,
    pub total: Decimal,
    pub per_line_discounts: BTreeMap<Sku, Decimal>,
    pub applications: Vec<CouponApplication>,
    /// Applied coupons after clamping to the subtotal.
    pub contributions: Vec<DiscountResult>,
    pub clamped: bool,
}

impl CheckoutQuote {
    /// Aggregates the applied outcomes in `applications` into a quote. Used for
    /// the initial quote and again when finalization drops a coupon.
    pub fn assemble(
        currency: impl Into<String>,
        subtotal: Decimal,
        applications: Vec<CouponApplication>,
        settings: &EngineSettings,
    ) -> Self {
        let applied: Vec<DiscountResult> = applications
            .iter()
            .filter_map(|application| application.applied_result().cloned())
            .collect();
        let aggregated = aggregate(subtotal, &applied, settings);

        Self {
            currency: currency.into(),
            subtotal,
            total_discount: aggregated.total_discount,
            total: subtotal - aggregated.total_discount,
            per_line_discounts: aggregated.per_line_discounts,
            applications,
            contributions: aggregated.contributions,
            clamped: aggregated.clamped,
        }
    }

    pub fn applied_codes(&self) -> Vec<&CouponCode> {
        self.applications
            .iter()
            .filter(|application| application.applied_result().is_some())
            .map(|application| &application.code)
            .collect()
    }

    /// Records to persist on the order, one per applied coupon.
    pub fn applied_records(&self) -> Vec<AppliedCouponRecord> {
        self.contributions
            .iter()
            .map(|contribution| {
                let description = self
                    .applications
                    .iter()
                    .find(|application| application.code == contribution.applied_code)
                    .and_then(|application| application.description.as_deref());
                contribution.to_record(description)
            })
            .collect()
    }

    pub fn fingerprint(&self) -> String {
        canonical_fingerprint(self, &self.currency)
    }
}

pub trait DiscountRuntime: Send + Sync {
    fn quote(&self, request: QuoteRequest<'_>) -> CheckoutQuote;
}

pub struct DeterministicDiscountRuntime<V = DeterministicValidityPolicy> {
    validity_policy: V,
    settings: EngineSettings,
    currency: String,
}

impl<V> DeterministicDiscountRuntime<V> {
    pub fn new(validity_policy: V, settings: EngineSettings, currency: impl Into<String>) -> Self {
        Self { validity_policy, settings, currency: currency.into() }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
}

impl Default for DeterministicDiscountRuntime<DeterministicValidityPolicy> {
    fn default() -> Self {
        Self::new(DeterministicValidityPolicy, EngineSettings::default(), "USD")
    }
}

impl<V> DiscountRuntime for DeterministicDiscountRuntime<V>
where
    V: ValidityPolicy,
{
    fn quote(&self, request: QuoteRequest<'_>) -> CheckoutQuote {
        let lines = price_cart(request.cart);
        let subtotal = subtotal(&lines);

        let mut already_applied: Vec<AppliedCouponRef> = Vec::new();
        let mut applications = Vec::with_capacity(request.coupons.len());

        for coupon in request.coupons {
            let context = ValidationContext {
                now: request.now,
                subtotal,
                redemptions: request.redemptions.get(&coupon.code).copied().unwrap_or_default(),
                already_applied: &already_applied,
            };

            let outcome = match self.validity_policy.check(coupon, &context) {
                ValidityState::Accepted => match resolve(coupon, &lines, &self.settings) {
                    Ok(result) => {
                        already_applied.push(AppliedCouponRef {
                            discounted: !result.is_zero(),
                            ..AppliedCouponRef::from(coupon)
                        });
                        CouponOutcome::Applied { result }
                    }
                    Err(definition_error) => {
                        error!(
                            event_name = "discount.coupon.invalid_definition",
                            coupon_code = %coupon.code,
                            error = %definition_error,
                            "malformed coupon reached checkout; applying no discount"
                        );
                        CouponOutcome::NotApplicable {
                            reason: RejectionReason::InvalidDefinition {
                                message: definition_error.to_string(),
                            },
                        }
                    }
                },
                ValidityState::Rejected { reason } => {
                    debug!(
                        event_name = "discount.coupon.rejected",
                        coupon_code = %coupon.code,
                        reason_code = reason.code(),
                        "coupon not applicable"
                    );
                    CouponOutcome::NotApplicable { reason }
                }
                ValidityState::Pending => CouponOutcome::NotApplicable {
                    reason: RejectionReason::InvalidDefinition {
                        message: "validity check did not settle".to_owned(),
                    },
                },
            };

            applications.push(CouponApplication {
                code: coupon.code.clone(),
                description: coupon.description.clone(),
                outcome,
            });
        }

        let quote = CheckoutQuote::assemble(&self.currency, subtotal, applications, &self.settings);
        debug!(
            event_name = "discount.quote.computed",
            subtotal = %quote.subtotal,
            total_discount = %quote.total_discount,
            applied = quote.contributions.len(),
            clamped = quote.clamped,
            "checkout quote computed"
        );
        quote
    }
}
