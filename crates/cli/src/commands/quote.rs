use std::collections::BTreeMap;
use std::path::PathBuf;

use cartwright_core::audit::InMemoryAuditSink;
use cartwright_core::config::AppConfig;
use cartwright_core::{
    auto_apply_candidates, finalize_order, redemption_snapshot, AuditContext, AuditEvent,
    CartSnapshot, CheckoutQuote, CouponCode, CouponDefinition, DeterministicDiscountRuntime,
    DeterministicValidityPolicy, DiscountRuntime, FinalizedOrder, InMemoryRedemptionLedger,
    InterfaceError, OrderId, QuoteRequest, RedemptionCounts, UserId,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::commands::{read_json, CommandResult};

const COMMAND: &str = "quote";

#[derive(Clone, Debug, Default)]
pub struct QuoteArgs {
    pub cart: PathBuf,
    pub coupons: PathBuf,
    pub user: Option<String>,
    /// RFC 3339 timestamp; defaults to the current time.
    pub now: Option<String>,
    /// JSON object of prior usage keyed by coupon code.
    pub usage: Option<PathBuf>,
    /// Commits the applied coupons as this order.
    pub order_id: Option<String>,
    /// Only quote the coupons flagged for automatic application.
    pub auto_apply: bool,
}

#[derive(Debug, Serialize)]
struct QuoteReport<'a> {
    command: &'static str,
    status: &'static str,
    fingerprint: String,
    quote: &'a CheckoutQuote,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    deactivated: Vec<CouponCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    order: Option<FinalizedOrder>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    audit: Vec<AuditEvent>,
}

pub fn run(args: QuoteArgs, config: &AppConfig) -> CommandResult {
    let now = match parse_now(args.now.as_deref()) {
        Ok(now) => now,
        Err(message) => return CommandResult::failure(COMMAND, "invalid_argument", message, 3),
    };

    let cart: CartSnapshot = match read_json(&args.cart) {
        Ok(cart) => cart,
        Err(error) => {
            return CommandResult::failure(COMMAND, "cart_parse", format!("{error:#}"), 3)
        }
    };
    let mut coupons: Vec<CouponDefinition> = match read_json(&args.coupons) {
        Ok(coupons) => coupons,
        Err(error) => {
            return CommandResult::failure(COMMAND, "coupons_parse", format!("{error:#}"), 3)
        }
    };
    let usage: BTreeMap<CouponCode, RedemptionCounts> = match &args.usage {
        Some(path) => match read_json(path) {
            Ok(usage) => usage,
            Err(error) => {
                return CommandResult::failure(COMMAND, "usage_parse", format!("{error:#}"), 3)
            }
        },
        None => BTreeMap::new(),
    };

    let deactivated: Vec<CouponCode> = coupons
        .iter_mut()
        .filter_map(|coupon| coupon.refresh_activity(now).then(|| coupon.code.clone()))
        .collect();
    if args.auto_apply {
        coupons = auto_apply_candidates(&coupons, now).into_iter().cloned().collect();
    }

    let correlation_id = args.order_id.clone().unwrap_or_else(|| COMMAND.to_owned());
    let user = args.user.map(UserId);
    let ledger = InMemoryRedemptionLedger::new();
    for (code, counts) in &usage {
        ledger.seed(code, user.as_ref(), *counts);
    }
    let redemptions = match redemption_snapshot(&ledger, &coupons, user.as_ref()) {
        Ok(redemptions) => redemptions,
        Err(error) => return ledger_failure(&error.into_interface(&correlation_id)),
    };

    let settings = config.engine.settings();
    let runtime = DeterministicDiscountRuntime::new(
        DeterministicValidityPolicy,
        settings,
        config.engine.currency.clone(),
    );
    let quote = runtime.quote(QuoteRequest {
        cart: &cart,
        coupons: &coupons,
        now,
        redemptions: &redemptions,
    });

    let audit = InMemoryAuditSink::default();
    let order = match args.order_id {
        Some(order_id) => {
            let order_id = OrderId(order_id);
            let context = AuditContext::new(
                Some(order_id.clone()),
                user.clone(),
                correlation_id.clone(),
                "cli",
            );
            match finalize_order(
                &ledger,
                &audit,
                &context,
                &order_id,
                user.as_ref(),
                quote.clone(),
                &coupons,
                &settings,
            ) {
                Ok(order) => Some(order),
                Err(error) => return ledger_failure(&error.into_interface(&correlation_id)),
            }
        }
        None => None,
    };

    let report = QuoteReport {
        command: COMMAND,
        status: "ok",
        fingerprint: quote.fingerprint(),
        quote: &quote,
        deactivated,
        order,
        audit: audit.events(),
    };
    CommandResult::report(COMMAND, &report, 0)
}

/// Bad input exits 4 like a failed coupon check; ledger trouble exits 5.
fn ledger_failure(error: &InterfaceError) -> CommandResult {
    let exit_code = match error {
        InterfaceError::BadRequest { .. } => 4,
        InterfaceError::ServiceUnavailable { .. } | InterfaceError::Internal { .. } => 5,
    };
    CommandResult::interface_failure(COMMAND, error, exit_code)
}

fn parse_now(raw: Option<&str>) -> Result<DateTime<Utc>, String> {
    match raw {
        Some(raw) => DateTime::parse_from_rfc3339(raw.trim())
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|error| format!("invalid --now timestamp `{raw}`: {error}")),
        None => Ok(Utc::now()),
    }
}
