use std::path::Path;

use cartwright_core::{CouponCatalog, CouponCode, CouponDraft, DiscountType};
use chrono::Utc;
use serde::Serialize;

use crate::commands::{read_json, CommandResult};

const COMMAND: &str = "check-coupons";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Valid,
    Invalid,
}

#[derive(Debug, Serialize)]
struct CouponCheck {
    code: CouponCode,
    status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    discount_type: Option<DiscountType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    command: &'static str,
    status: &'static str,
    valid: usize,
    invalid: usize,
    coupons: Vec<CouponCheck>,
    /// Valid coupons that would be applied automatically right now.
    auto_apply: Vec<CouponCode>,
}

/// Runs the creation-time contracts over every draft in the file. Duplicate
/// codes are reported against the later draft.
pub fn run(coupons: &Path) -> CommandResult {
    let drafts: Vec<CouponDraft> = match read_json(coupons) {
        Ok(drafts) => drafts,
        Err(error) => {
            return CommandResult::failure(COMMAND, "coupons_parse", format!("{error:#}"), 3)
        }
    };

    let mut catalog = CouponCatalog::new();
    let mut checks = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let code = CouponCode::new(&draft.code);
        let outcome = draft.build().and_then(|coupon| {
            let discount_type = coupon.discount_type();
            catalog.insert(coupon).map(|()| discount_type)
        });
        checks.push(match outcome {
            Ok(discount_type) => CouponCheck {
                code,
                status: CheckStatus::Valid,
                discount_type: Some(discount_type),
                error: None,
            },
            Err(error) => CouponCheck {
                code,
                status: CheckStatus::Invalid,
                discount_type: None,
                error: Some(error.to_string()),
            },
        });
    }

    let invalid = checks.iter().filter(|check| check.status == CheckStatus::Invalid).count();
    let auto_apply = catalog
        .auto_apply_candidates(Utc::now())
        .into_iter()
        .map(|coupon| coupon.code.clone())
        .collect();
    let report = CheckReport {
        command: COMMAND,
        status: if invalid == 0 { "ok" } else { "error" },
        valid: checks.len() - invalid,
        invalid,
        coupons: checks,
        auto_apply,
    };

    CommandResult::report(COMMAND, &report, if invalid == 0 { 0 } else { 4 })
}
