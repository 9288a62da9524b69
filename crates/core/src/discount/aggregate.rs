use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::discount::allocation::allocate_capped;
use crate::discount::EngineSettings;
use crate::domain::cart::Sku;
use crate::domain::discount::DiscountResult;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedDiscount {
    pub subtotal: Decimal,
    pub total_discount: Decimal,
    pub per_line_discounts: BTreeMap<Sku, Decimal>,
    /// Each coupon's share after clamping, in application order.
    pub contributions: Vec<DiscountResult>,
    pub clamped: bool,
}

/// Combines independently computed coupon results. Each result was computed
/// against the original subtotal; when their sum exceeds it, every coupon is
/// scaled down proportionally so the total equals the subtotal exactly. No
/// coupon or line ever ends up above its unclamped amount.
pub fn aggregate(
    subtotal: Decimal,
    results: &[DiscountResult],
    settings: &EngineSettings,
) -> AggregatedDiscount {
    let cap = subtotal.max(Decimal::ZERO);
    let raw_total: Decimal = results.iter().map(|result| result.discount_amount).sum();
    let clamped = raw_total > cap;
    let contributions =
        if clamped { scale_down(cap, results, settings) } else { results.to_vec() };

    let mut per_line_discounts = BTreeMap::new();
    for contribution in &contributions {
        for (sku, amount) in &contribution.per_line_discounts {
            *per_line_discounts.entry(sku.clone()).or_insert(Decimal::ZERO) += *amount;
        }
    }
    let total_discount = contributions.iter().map(|result| result.discount_amount).sum();

    AggregatedDiscount { subtotal, total_discount, per_line_discounts, contributions, clamped }
}

fn scale_down(
    cap: Decimal,
    results: &[DiscountResult],
    settings: &EngineSettings,
) -> Vec<DiscountResult> {
    let positive: Vec<usize> = results
        .iter()
        .enumerate()
        .filter_map(|(index, result)| (result.discount_amount > Decimal::ZERO).then_some(index))
        .collect();
    let weights: Vec<Decimal> =
        positive.iter().map(|&index| results[index].discount_amount).collect();
    let targets = allocate_capped(cap, &weights, settings);

    let mut scaled = results.to_vec();
    for (&index, target) in positive.iter().zip(targets) {
        scaled[index] = rescale(&results[index], target, settings);
    }
    scaled
}

fn rescale(result: &DiscountResult, target: Decimal, settings: &EngineSettings) -> DiscountResult {
    let weights: Vec<Decimal> = result.per_line_discounts.values().copied().collect();
    let shares = allocate_capped(target, &weights, settings);

    DiscountResult {
        applied_code: result.applied_code.clone(),
        discount_type: result.discount_type,
        discount_amount: target,
        per_line_discounts: result.per_line_discounts.keys().cloned().zip(shares).collect(),
    }
}
