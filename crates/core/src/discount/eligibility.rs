use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::discount::pricer::PricedLine;
use crate::domain::cart::Sku;
use crate::domain::coupon::DiscountKind;

/// How a BOGO coupon with an empty SKU allow-list is read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyAllowListPolicy {
    #[default]
    AllLines,
    NoLines,
}

/// One flag per priced line, in cart order.
pub fn eligibility_mask(
    kind: &DiscountKind,
    lines: &[PricedLine],
    empty_bogo_allow_list: EmptyAllowListPolicy,
) -> Vec<bool> {
    match kind {
        DiscountKind::PercentAll { .. } | DiscountKind::Fixed { .. } => {
            lines.iter().map(|line| line.quantity > 0).collect()
        }
        DiscountKind::PercentSpecific { eligible_products, .. } => {
            allow_listed(lines, eligible_products)
        }
        DiscountKind::Bogo { eligible_skus, .. } => {
            if eligible_skus.is_empty() {
                let all = empty_bogo_allow_list == EmptyAllowListPolicy::AllLines;
                return lines.iter().map(|line| all && line.quantity > 0).collect();
            }
            allow_listed(lines, eligible_skus)
        }
    }
}

/// Lines that qualify for the coupon, cart order preserved.
pub fn eligible_lines<'a>(
    kind: &DiscountKind,
    lines: &'a [PricedLine],
    empty_bogo_allow_list: EmptyAllowListPolicy,
) -> Vec<&'a PricedLine> {
    eligibility_mask(kind, lines, empty_bogo_allow_list)
        .into_iter()
        .zip(lines)
        .filter_map(|(eligible, line)| eligible.then_some(line))
        .collect()
}

fn allow_listed(lines: &[PricedLine], skus: &BTreeSet<Sku>) -> Vec<bool> {
    let allowed: BTreeSet<String> = skus.iter().map(Sku::normalized).collect();
    lines.iter().map(|line| line.quantity > 0 && allowed.contains(&line.sku.normalized())).collect()
}
