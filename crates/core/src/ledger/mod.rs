//! Coupon redemption ledger.
//!
//! Validation only reads redemption counts. The ledger is the write side: it
//! re-checks the limits and increments inside one critical section, so two
//! checkouts racing for the last redemption cannot both succeed.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::discount::validity::RejectionReason;
use crate::domain::coupon::{CouponCode, CouponDefinition};
use crate::domain::redemption::{CouponRedemption, OrderId, RedemptionCounts, UserId};
use crate::errors::ApplicationError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommitOutcome {
    /// Counts after the increment.
    Recorded { counts: RedemptionCounts },
    /// This order already redeemed the coupon; nothing was incremented.
    AlreadyRecorded { counts: RedemptionCounts },
    /// A limit was reached between validation and commit.
    RaceConflict { reason: RejectionReason },
}

/// One committed redemption, keyed by `(order_id, code)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionRecord {
    pub order_id: OrderId,
    pub code: CouponCode,
    pub user_id: Option<UserId>,
    pub committed_at: DateTime<Utc>,
}

pub trait RedemptionLedger: Send + Sync {
    /// Current counts for `code`; `for_user` is zero when no user is given.
    fn snapshot(
        &self,
        code: &CouponCode,
        user: Option<&UserId>,
    ) -> Result<RedemptionCounts, ApplicationError>;

    /// Re-checks the coupon's limits and records one redemption. Idempotent
    /// per `(order_id, code)`.
    fn commit(
        &self,
        order_id: &OrderId,
        coupon: &CouponDefinition,
        user: Option<&UserId>,
    ) -> Result<CommitOutcome, ApplicationError>;
}

/// Reads the counts for every coupon in one pass, ready for a quote request.
pub fn redemption_snapshot(
    ledger: &dyn RedemptionLedger,
    coupons: &[CouponDefinition],
    user: Option<&UserId>,
) -> Result<BTreeMap<CouponCode, RedemptionCounts>, ApplicationError> {
    coupons
        .iter()
        .map(|coupon| Ok((coupon.code.clone(), ledger.snapshot(&coupon.code, user)?)))
        .collect()
}

#[derive(Debug, Default)]
struct LedgerState {
    global: BTreeMap<CouponCode, u32>,
    per_user: BTreeMap<(CouponCode, UserId), u32>,
    records: BTreeMap<(OrderId, CouponCode), RedemptionRecord>,
}

impl LedgerState {
    fn counts(&self, code: &CouponCode, user: Option<&UserId>) -> RedemptionCounts {
        let global = self.global.get(code).copied().unwrap_or(0);
        let for_user = user
            .and_then(|user| self.per_user.get(&(code.clone(), user.clone())).copied())
            .unwrap_or(0);
        RedemptionCounts { global, for_user }
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryRedemptionLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl InMemoryRedemptionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets prior usage, e.g. counts carried over from an external store.
    pub fn seed(&self, code: &CouponCode, user: Option<&UserId>, counts: RedemptionCounts) {
        let mut state = self.lock();
        state.global.insert(code.clone(), counts.global);
        if let Some(user) = user {
            state.per_user.insert((code.clone(), user.clone()), counts.for_user);
        }
    }

    pub fn records(&self) -> Vec<RedemptionRecord> {
        self.lock().records.values().cloned().collect()
    }

    /// Per-user counters for `code`.
    pub fn redemptions(&self, code: &CouponCode) -> Vec<CouponRedemption> {
        self.lock()
            .per_user
            .iter()
            .filter(|((counted_code, _), _)| counted_code == code)
            .map(|((counted_code, user_id), usage_count)| CouponRedemption {
                code: counted_code.clone(),
                user_id: user_id.clone(),
                usage_count: *usage_count,
            })
            .collect()
    }

    /// Inspection and seeding read through a poisoned lock.
    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A writer that panicked mid-commit may have left the counters half
    /// updated, so the checkout path refuses to use them.
    fn transaction(&self) -> Result<MutexGuard<'_, LedgerState>, ApplicationError> {
        self.state.lock().map_err(|_| {
            ApplicationError::Persistence("redemption ledger lock poisoned".to_owned())
        })
    }
}

impl RedemptionLedger for InMemoryRedemptionLedger {
    fn snapshot(
        &self,
        code: &CouponCode,
        user: Option<&UserId>,
    ) -> Result<RedemptionCounts, ApplicationError> {
        Ok(self.transaction()?.counts(code, user))
    }

    fn commit(
        &self,
        order_id: &OrderId,
        coupon: &CouponDefinition,
        user: Option<&UserId>,
    ) -> Result<CommitOutcome, ApplicationError> {
        let mut state = self.transaction()?;
        let code = &coupon.code;
        let current = state.counts(code, user);

        if state.records.contains_key(&(order_id.clone(), code.clone())) {
            return Ok(CommitOutcome::AlreadyRecorded { counts: current });
        }

        let conflict = match (coupon.usage_limit, coupon.usage_limit_per_user) {
            (Some(limit), _) if current.global >= limit => {
                Some(RejectionReason::UsageLimitReached { limit })
            }
            (_, Some(limit)) if user.is_some() && current.for_user >= limit => {
                Some(RejectionReason::PerUserLimitReached { limit })
            }
            _ => None,
        };
        if let Some(reason) = conflict {
            warn!(
                event_name = "redemption.commit.race_conflict",
                order_id = %order_id.0,
                coupon_code = %code,
                reason_code = reason.code(),
                "redemption limit reached before commit"
            );
            return Ok(CommitOutcome::RaceConflict { reason });
        }

        let global = current.global.saturating_add(1);
        state.global.insert(code.clone(), global);
        let for_user = match user {
            Some(user) => {
                let count = current.for_user.saturating_add(1);
                state.per_user.insert((code.clone(), user.clone()), count);
                count
            }
            None => 0,
        };
        state.records.insert(
            (order_id.clone(), code.clone()),
            RedemptionRecord {
                order_id: order_id.clone(),
                code: code.clone(),
                user_id: user.cloned(),
                committed_at: Utc::now(),
            },
        );

        info!(
            event_name = "redemption.commit.recorded",
            order_id = %order_id.0,
            coupon_code = %code,
            global_count = global,
            "coupon redemption recorded"
        );
        Ok(CommitOutcome::Recorded { counts: RedemptionCounts { global, for_user } })
    }
}
