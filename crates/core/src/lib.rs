pub mod audit;
pub mod checkout;
pub mod config;
pub mod discount;
pub mod domain;
pub mod errors;
pub mod ledger;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use checkout::{finalize_order, FinalizedOrder};
pub use config::{AppConfig, ConfigError, LoadOptions};
pub use discount::eligibility::EmptyAllowListPolicy;
pub use discount::validity::{DeterministicValidityPolicy, RejectionReason, ValidityPolicy};
pub use discount::{
    CheckoutQuote, CouponApplication, CouponOutcome, DeterministicDiscountRuntime,
    DiscountRuntime, EngineSettings, QuoteRequest, RoundingPolicy,
};
pub use domain::cart::{CartLineItem, CartSnapshot, Sku};
pub use domain::coupon::{
    auto_apply_candidates, CouponCatalog, CouponCode, CouponDefinition, CouponDraft,
    DiscountKind, DiscountType,
};
pub use domain::discount::{AppliedCouponRecord, DiscountResult};
pub use domain::redemption::{OrderId, RedemptionCounts, UserId};
pub use errors::{ApplicationError, CouponDefinitionError, DomainError, InterfaceError};
pub use ledger::{
    redemption_snapshot, CommitOutcome, InMemoryRedemptionLedger, RedemptionLedger,
};
