use serde::{Deserialize, Serialize};

use crate::domain::coupon::CouponCode;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

/// Redemption counts read before validation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionCounts {
    pub global: u32,
    pub for_user: u32,
}

/// Usage counter for one (coupon, user) pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponRedemption {
    pub code: CouponCode,
    pub user_id: UserId,
    pub usage_count: u32,
}
