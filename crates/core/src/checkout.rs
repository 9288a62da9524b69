use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::discount::{CheckoutQuote, CouponOutcome, EngineSettings};
use crate::domain::coupon::{CouponCode, CouponDefinition};
use crate::domain::discount::AppliedCouponRecord;
use crate::domain::redemption::{OrderId, UserId};
use crate::errors::{ApplicationError, DomainError};
use crate::ledger::{CommitOutcome, RedemptionLedger};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedOrder {
    pub order_id: OrderId,
    pub quote: CheckoutQuote,
    pub applied_coupons: Vec<AppliedCouponRecord>,
    /// Coupons that lost a redemption race and were removed from the order.
    pub dropped: Vec<CouponCode>,
}

/// Commits every applied coupon of `quote` and returns the order's final
/// discount. A coupon whose limit was reached since the quote was computed is
/// dropped and the remaining coupons are re-aggregated; the order itself still
/// completes. Safe to retry with the same `order_id`.
#[allow(clippy::too_many_arguments)]
pub fn finalize_order(
    ledger: &dyn RedemptionLedger,
    audit: &dyn AuditSink,
    context: &AuditContext,
    order_id: &OrderId,
    user: Option<&UserId>,
    quote: CheckoutQuote,
    coupons: &[CouponDefinition],
    settings: &EngineSettings,
) -> Result<FinalizedOrder, ApplicationError> {
    let CheckoutQuote { currency, subtotal, mut applications, .. } = quote;
    let mut dropped = Vec::new();

    // Resolve every definition before touching the ledger.
    let mut pending = Vec::new();
    for (index, application) in applications.iter().enumerate() {
        if application.applied_result().is_none() {
            continue;
        }
        let coupon = coupons.iter().find(|coupon| coupon.code == application.code).ok_or_else(
            || {
                DomainError::InvariantViolation(format!(
                    "applied coupon `{}` has no definition",
                    application.code
                ))
            },
        )?;
        pending.push((index, coupon));
    }

    // A ledger error part way through leaves earlier commits in place; retrying
    // with the same order id replays them as duplicates.
    for (index, coupon) in pending {
        match ledger.commit(order_id, coupon, user)? {
            CommitOutcome::Recorded { counts } => audit.emit(
                context
                    .event("redemption.committed", AuditCategory::Redemption, AuditOutcome::Success)
                    .with_metadata("coupon_code", coupon.code.as_str())
                    .with_metadata("global_count", counts.global.to_string())
                    .with_metadata("user_count", counts.for_user.to_string()),
            ),
            CommitOutcome::AlreadyRecorded { .. } => audit.emit(
                context
                    .event("redemption.duplicate", AuditCategory::Redemption, AuditOutcome::Success)
                    .with_metadata("coupon_code", coupon.code.as_str()),
            ),
            CommitOutcome::RaceConflict { reason } => {
                audit.emit(
                    context
                        .event(
                            "redemption.race_conflict",
                            AuditCategory::Redemption,
                            AuditOutcome::Rejected,
                        )
                        .with_metadata("coupon_code", coupon.code.as_str())
                        .with_metadata("reason", reason.code()),
                );
                dropped.push(coupon.code.clone());
                applications[index].outcome = CouponOutcome::NotApplicable { reason };
            }
        }
    }

    let quote = CheckoutQuote::assemble(currency, subtotal, applications, settings);
    let applied_coupons = quote.applied_records();

    info!(
        event_name = "checkout.order.finalized",
        order_id = %order_id.0,
        correlation_id = %context.correlation_id,
        total_discount = %quote.total_discount,
        applied = applied_coupons.len(),
        dropped = dropped.len(),
        "order finalized"
    );
    audit.emit(
        context
            .event("checkout.finalized", AuditCategory::Pricing, AuditOutcome::Success)
            .with_metadata("total_discount", quote.total_discount.to_string())
            .with_metadata("fingerprint", quote.fingerprint()),
    );

    Ok(FinalizedOrder { order_id: order_id.clone(), quote, applied_coupons, dropped })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::finalize_order;
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::discount::validity::RejectionReason;
    use crate::discount::{
        CheckoutQuote, DeterministicDiscountRuntime, DiscountRuntime, EngineSettings, QuoteRequest,
    };
    use crate::domain::cart::{CartLineItem, CartSnapshot};
    use crate::domain::coupon::{CouponCode, CouponDefinition, DiscountKind};
    use crate::domain::redemption::{OrderId, RedemptionCounts, UserId};
    use crate::errors::{ApplicationError, DomainError};
    use crate::ledger::{redemption_snapshot, InMemoryRedemptionLedger, RedemptionLedger};

    fn coupons() -> Vec<CouponDefinition> {
        let mut percent =
            CouponDefinition::new("TEN", DiscountKind::PercentAll { percent: Decimal::TEN });
        percent.stackable = true;
        let mut fixed =
            CouponDefinition::new("LAST", DiscountKind::Fixed { amount: Decimal::new(25, 0) });
        fixed.stackable = true;
        fixed.usage_limit = Some(1);
        vec![percent, fixed]
    }

    fn quote(ledger: &InMemoryRedemptionLedger, user: &UserId) -> CheckoutQuote {
        let cart = CartSnapshot::new(vec![
            CartLineItem::new("A", 2, Decimal::new(100, 0)),
            CartLineItem::new("B", 1, Decimal::new(50, 0)),
        ]);
        let coupons = coupons();
        let redemptions = redemption_snapshot(ledger, &coupons, Some(user)).expect("snapshot");
        DeterministicDiscountRuntime::default().quote(QuoteRequest {
            cart: &cart,
            coupons: &coupons,
            now: Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).single().expect("clock"),
            redemptions: &redemptions,
        })
    }

    fn context(order: &str) -> AuditContext {
        AuditContext::new(Some(OrderId(order.to_owned())), None, "req-1", "checkout")
    }

    #[test]
    fn finalize_commits_each_applied_coupon() {
        let ledger = InMemoryRedemptionLedger::new();
        let audit = InMemoryAuditSink::default();
        let user = UserId("alice".to_owned());
        let order = OrderId("O-1".to_owned());
        let quote = quote(&ledger, &user);
        assert_eq!(quote.total_discount, Decimal::new(50, 0));

        let finalized = finalize_order(
            &ledger,
            &audit,
            &context("O-1"),
            &order,
            Some(&user),
            quote.clone(),
            &coupons(),
            &EngineSettings::default(),
        )
        .expect("finalize");

        assert!(finalized.dropped.is_empty());
        assert_eq!(finalized.quote, quote);
        assert_eq!(finalized.applied_coupons.len(), 2);
        assert_eq!(
            ledger.snapshot(&CouponCode::new("LAST"), Some(&user)).expect("snapshot"),
            RedemptionCounts { global: 1, for_user: 1 }
        );
        assert_eq!(audit.events_of_type("redemption.committed").len(), 2);
    }

    #[test]
    fn race_conflict_drops_the_coupon_and_reaggregates() {
        let ledger = InMemoryRedemptionLedger::new();
        let audit = InMemoryAuditSink::default();
        let alice = UserId("alice".to_owned());
        let bob = UserId("bob".to_owned());

        // Both quotes see the last redemption of LAST as available.
        let alice_quote = quote(&ledger, &alice);
        let bob_quote = quote(&ledger, &bob);
        let settings = EngineSettings::default();

        finalize_order(
            &ledger,
            &audit,
            &context("O-A"),
            &OrderId("O-A".to_owned()),
            Some(&alice),
            alice_quote,
            &coupons(),
            &settings,
        )
        .expect("alice finalizes");
        let bob_order = finalize_order(
            &ledger,
            &audit,
            &context("O-B"),
            &OrderId("O-B".to_owned()),
            Some(&bob),
            bob_quote,
            &coupons(),
            &settings,
        )
        .expect("bob's order still completes");

        assert_eq!(bob_order.dropped, vec![CouponCode::new("LAST")]);
        assert_eq!(bob_order.quote.total_discount, Decimal::new(25, 0));
        assert_eq!(bob_order.quote.total, Decimal::new(225, 0));
        assert_eq!(bob_order.applied_coupons.len(), 1);
        assert_eq!(
            bob_order.quote.applications[1].rejection(),
            Some(&RejectionReason::UsageLimitReached { limit: 1 })
        );
        assert_eq!(audit.events_of_type("redemption.race_conflict").len(), 1);
        assert_eq!(ledger.snapshot(&CouponCode::new("LAST"), None).expect("snapshot").global, 1);
    }

    #[test]
    fn retrying_finalize_does_not_double_count() {
        let ledger = InMemoryRedemptionLedger::new();
        let audit = InMemoryAuditSink::default();
        let user = UserId("alice".to_owned());
        let order = OrderId("O-1".to_owned());
        let quote = quote(&ledger, &user);
        let settings = EngineSettings::default();

        for _ in 0..2 {
            let finalized = finalize_order(
                &ledger,
                &audit,
                &context("O-1"),
                &order,
                Some(&user),
                quote.clone(),
                &coupons(),
                &settings,
            )
            .expect("finalize");
            assert!(finalized.dropped.is_empty());
        }

        assert_eq!(ledger.snapshot(&CouponCode::new("TEN"), None).expect("snapshot").global, 1);
        assert_eq!(audit.events_of_type("redemption.duplicate").len(), 2);
    }

    #[test]
    fn missing_definition_is_an_invariant_violation() {
        let ledger = InMemoryRedemptionLedger::new();
        let user = UserId("alice".to_owned());
        let quote = quote(&ledger, &user);

        let error = finalize_order(
            &ledger,
            &InMemoryAuditSink::default(),
            &context("O-1"),
            &OrderId("O-1".to_owned()),
            Some(&user),
            quote,
            &[],
            &EngineSettings::default(),
        )
        .expect_err("definitions are required");

        assert!(matches!(error, ApplicationError::Domain(DomainError::InvariantViolation(_))));
        assert!(ledger.records().is_empty());
    }

    #[test]
    fn missing_later_definition_commits_nothing() {
        let ledger = InMemoryRedemptionLedger::new();
        let audit = InMemoryAuditSink::default();
        let user = UserId("alice".to_owned());
        let quote = quote(&ledger, &user);
        let first_only: Vec<CouponDefinition> = coupons().into_iter().take(1).collect();

        let error = finalize_order(
            &ledger,
            &audit,
            &context("O-1"),
            &OrderId("O-1".to_owned()),
            Some(&user),
            quote,
            &first_only,
            &EngineSettings::default(),
        )
        .expect_err("every applied coupon needs a definition");

        assert!(matches!(error, ApplicationError::Domain(DomainError::InvariantViolation(_))));
        assert!(ledger.records().is_empty());
        assert!(audit.events_of_type("redemption.committed").is_empty());
    }
}
