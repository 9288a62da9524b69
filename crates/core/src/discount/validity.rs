use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::coupon::{CouponCode, CouponDefinition};
use crate::domain::redemption::RedemptionCounts;

/// A coupon already accepted earlier in the same checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCouponRef {
    pub code: CouponCode,
    pub stackable: bool,
    /// False when the coupon was accepted but discounted nothing. Such a coupon
    /// still blocks its own code but takes no part in exclusivity.
    pub discounted: bool,
}

impl From<&CouponDefinition> for AppliedCouponRef {
    fn from(coupon: &CouponDefinition) -> Self {
        Self { code: coupon.code.clone(), stackable: coupon.stackable, discounted: true }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationContext<'a> {
    pub now: DateTime<Utc>,
    pub subtotal: Decimal,
    pub redemptions: RedemptionCounts,
    pub already_applied: &'a [AppliedCouponRef],
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    Inactive,
    NotYetActive { starts_at: DateTime<Utc> },
    Expired { ends_at: DateTime<Utc> },
    BelowMinimumCartValue { minimum: Decimal, subtotal: Decimal },
    UsageLimitReached { limit: u32 },
    PerUserLimitReached { limit: u32 },
    AlreadyApplied,
    BlockedByExclusiveCoupon { code: CouponCode },
    NotStackable,
    InvalidDefinition { message: String },
}

impl RejectionReason {
    /// Machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Inactive => "coupon_inactive",
            Self::NotYetActive { .. } => "coupon_not_yet_active",
            Self::Expired { .. } => "coupon_expired",
            Self::BelowMinimumCartValue { .. } => "below_minimum_cart_value",
            Self::UsageLimitReached { .. } => "usage_limit_reached",
            Self::PerUserLimitReached { .. } => "per_user_limit_reached",
            Self::AlreadyApplied => "coupon_already_applied",
            Self::BlockedByExclusiveCoupon { .. } => "blocked_by_exclusive_coupon",
            Self::NotStackable => "coupon_not_stackable",
            Self::InvalidDefinition { .. } => "invalid_definition",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inactive => write!(f, "coupon is not active"),
            Self::NotYetActive { starts_at } => write!(f, "coupon is valid from {starts_at}"),
            Self::Expired { ends_at } => write!(f, "coupon expired at {ends_at}"),
            Self::BelowMinimumCartValue { minimum, subtotal } => {
                write!(f, "cart subtotal {subtotal} is below the minimum of {minimum}")
            }
            Self::UsageLimitReached { limit } => {
                write!(f, "coupon has reached its usage limit of {limit}")
            }
            Self::PerUserLimitReached { limit } => {
                write!(f, "coupon has reached its per-customer limit of {limit}")
            }
            Self::AlreadyApplied => write!(f, "coupon is already applied"),
            Self::BlockedByExclusiveCoupon { code } => {
                write!(f, "coupon {code} cannot be combined with other coupons")
            }
            Self::NotStackable => write!(f, "coupon cannot be combined with other coupons"),
            Self::InvalidDefinition { message } => write!(f, "coupon is misconfigured: {message}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ValidityState {
    Pending,
    Accepted,
    Rejected { reason: RejectionReason },
}

impl ValidityState {
    /// Settles a pending check. Accepted and rejected are terminal.
    pub fn settle(self, check: Result<(), RejectionReason>) -> Self {
        match self {
            Self::Pending => match check {
                Ok(()) => Self::Accepted,
                Err(reason) => Self::Rejected { reason },
            },
            settled => settled,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn rejection(&self) -> Option<&RejectionReason> {
        match self {
            Self::Rejected { reason } => Some(reason),
            Self::Pending | Self::Accepted => None,
        }
    }
}

pub trait ValidityPolicy: Send + Sync {
    fn check(&self, coupon: &CouponDefinition, context: &ValidationContext<'_>) -> ValidityState;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DeterministicValidityPolicy;

impl ValidityPolicy for DeterministicValidityPolicy {
    fn check(&self, coupon: &CouponDefinition, context: &ValidationContext<'_>) -> ValidityState {
        check_validity(coupon, context)
    }
}

/// Runs the checks in order; the first failure is the reported reason. Reads
/// usage counts, never changes them.
pub fn check_validity(coupon: &CouponDefinition, context: &ValidationContext<'_>) -> ValidityState {
    ValidityState::Pending.settle(first_violation(coupon, context))
}

fn first_violation(
    coupon: &CouponDefinition,
    context: &ValidationContext<'_>,
) -> Result<(), RejectionReason> {
    if !coupon.is_active {
        return Err(RejectionReason::Inactive);
    }

    if let Some(starts_at) = coupon.starts_at {
        if context.now < starts_at {
            return Err(RejectionReason::NotYetActive { starts_at });
        }
    }
    if let Some(ends_at) = coupon.ends_at {
        if context.now > ends_at {
            return Err(RejectionReason::Expired { ends_at });
        }
    }

    if let Some(minimum) = coupon.min_cart_value {
        if context.subtotal < minimum {
            return Err(RejectionReason::BelowMinimumCartValue {
                minimum,
                subtotal: context.subtotal,
            });
        }
    }

    if let Some(limit) = coupon.usage_limit {
        if context.redemptions.global >= limit {
            return Err(RejectionReason::UsageLimitReached { limit });
        }
    }
    if let Some(limit) = coupon.usage_limit_per_user {
        if context.redemptions.for_user >= limit {
            return Err(RejectionReason::PerUserLimitReached { limit });
        }
    }

    check_stacking(coupon, context.already_applied)
}

fn check_stacking(
    coupon: &CouponDefinition,
    already_applied: &[AppliedCouponRef],
) -> Result<(), RejectionReason> {
    if already_applied.iter().any(|applied| applied.code == coupon.code) {
        return Err(RejectionReason::AlreadyApplied);
    }
    let mut discounting = already_applied.iter().filter(|applied| applied.discounted);
    if let Some(exclusive) = discounting.clone().find(|applied| !applied.stackable) {
        return Err(RejectionReason::BlockedByExclusiveCoupon { code: exclusive.code.clone() });
    }
    if !coupon.stackable && discounting.next().is_some() {
        return Err(RejectionReason::NotStackable);
    }
    Ok(())
}
