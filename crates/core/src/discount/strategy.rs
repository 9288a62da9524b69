use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::discount::allocation::{allocate_proportionally, assign_free_units, free_unit_count};
use crate::discount::eligibility::eligible_lines;
use crate::discount::pricer::{subtotal, PricedLine};
use crate::discount::EngineSettings;
use crate::domain::cart::Sku;
use crate::domain::coupon::{CouponDefinition, DiscountKind};
use crate::domain::discount::DiscountResult;
use crate::errors::CouponDefinitionError;

/// Output of a single discount algorithm.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Allocation {
    pub discount_amount: Decimal,
    pub per_line: BTreeMap<Sku, Decimal>,
}

/// Picks the algorithm for the coupon's kind and runs it over the eligible
/// lines. Business-rule misses produce a zero result; only malformed
/// definitions are errors.
pub fn resolve(
    coupon: &CouponDefinition,
    lines: &[PricedLine],
    settings: &EngineSettings,
) -> Result<DiscountResult, CouponDefinitionError> {
    guard(coupon)?;

    let eligible = eligible_lines(&coupon.kind, lines, settings.empty_bogo_allow_list);
    let allocation = match &coupon.kind {
        DiscountKind::PercentAll { percent } => percent_all(*percent, &eligible, settings),
        DiscountKind::PercentSpecific { percent, .. } => {
            percent_specific(*percent, &eligible, settings)
        }
        DiscountKind::Fixed { amount } => fixed_amount(*amount, &eligible, settings),
        DiscountKind::Bogo { percent, buy_quantity, get_quantity, .. } => {
            buy_x_get_y(*percent, *buy_quantity, *get_quantity, &eligible, settings)
        }
    };

    Ok(DiscountResult {
        applied_code: coupon.code.clone(),
        discount_type: coupon.discount_type(),
        discount_amount: allocation.discount_amount,
        per_line_discounts: allocation.per_line,
    })
}

/// Rejects definitions that upstream validation should never have let through.
pub fn guard(coupon: &CouponDefinition) -> Result<(), CouponDefinitionError> {
    let code = || coupon.code.as_str().to_owned();
    let value = coupon.kind.value();
    if value < Decimal::ZERO {
        return Err(CouponDefinitionError::NegativeDiscountValue { code: code(), value });
    }

    match &coupon.kind {
        DiscountKind::Fixed { .. } => Ok(()),
        DiscountKind::PercentAll { percent } | DiscountKind::PercentSpecific { percent, .. } => {
            check_percent(code, *percent)
        }
        DiscountKind::Bogo { percent, buy_quantity, get_quantity, .. } => {
            check_percent(code, *percent)?;
            for (field, quantity) in [("buy", *buy_quantity), ("get", *get_quantity)] {
                if quantity < 1 {
                    return Err(CouponDefinitionError::BogoQuantityBelowOne {
                        code: code(),
                        field,
                        value: i64::from(quantity),
                    });
                }
            }
            Ok(())
        }
    }
}

fn check_percent(
    code: impl Fn() -> String,
    percent: Decimal,
) -> Result<(), CouponDefinitionError> {
    if percent > Decimal::ONE_HUNDRED {
        return Err(CouponDefinitionError::PercentageOutOfRange { code: code(), value: percent });
    }
    Ok(())
}

/// Percentage of the eligible subtotal, spread in proportion to line totals.
pub fn percent_all(
    percent: Decimal,
    eligible: &[&PricedLine],
    settings: &EngineSettings,
) -> Allocation {
    if eligible.is_empty() {
        return Allocation::default();
    }

    let eligible_subtotal = subtotal(eligible.iter().copied());
    let amount =
        settings.round(eligible_subtotal * percent / Decimal::ONE_HUNDRED).min(eligible_subtotal);
    spread(amount, eligible, settings)
}

/// Percentage of each eligible line on its own.
pub fn percent_specific(
    percent: Decimal,
    eligible: &[&PricedLine],
    settings: &EngineSettings,
) -> Allocation {
    let mut allocation = Allocation::default();
    for line in eligible {
        let line_discount =
            settings.round(line.line_total * percent / Decimal::ONE_HUNDRED).min(line.line_total);
        allocation.add(&line.sku, line_discount);
    }
    allocation
}

/// A fixed amount clamped to the eligible subtotal, spread in proportion to
/// line totals.
pub fn fixed_amount(
    amount: Decimal,
    eligible: &[&PricedLine],
    settings: &EngineSettings,
) -> Allocation {
    if amount <= Decimal::ZERO || eligible.is_empty() {
        return Allocation::default();
    }

    let eligible_subtotal = subtotal(eligible.iter().copied());
    let clamped = settings.round(amount).min(eligible_subtotal);
    spread(clamped, eligible, settings)
}

/// Buy `buy_quantity`, get `get_quantity` at `percent` off. Free units are
/// handed out in cart order.
pub fn buy_x_get_y(
    percent: Decimal,
    buy_quantity: u32,
    get_quantity: u32,
    eligible: &[&PricedLine],
    settings: &EngineSettings,
) -> Allocation {
    let total_quantity: u64 = eligible.iter().map(|line| u64::from(line.quantity)).sum();
    let free_units = free_unit_count(total_quantity, buy_quantity, get_quantity);
    if free_units == 0 {
        return Allocation::default();
    }

    let quantities: Vec<u32> = eligible.iter().map(|line| line.quantity).collect();
    let assigned = assign_free_units(&quantities, free_units);

    let mut allocation = Allocation::default();
    for (line, units) in eligible.iter().zip(assigned) {
        if units == 0 {
            continue;
        }
        let per_unit = line.effective_unit_price * percent / Decimal::ONE_HUNDRED;
        let line_discount = settings.round(per_unit * Decimal::from(units)).min(line.line_total);
        allocation.add(&line.sku, line_discount);
    }
    allocation
}

fn spread(amount: Decimal, eligible: &[&PricedLine], settings: &EngineSettings) -> Allocation {
    let weights: Vec<Decimal> = eligible.iter().map(|line| line.line_total).collect();
    let shares = allocate_proportionally(amount, &weights, settings);

    let mut allocation = Allocation::default();
    for (line, share) in eligible.iter().zip(shares) {
        allocation.add(&line.sku, share);
    }
    allocation
}

impl Allocation {
    fn add(&mut self, sku: &Sku, amount: Decimal) {
        *self.per_line.entry(sku.clone()).or_insert(Decimal::ZERO) += amount;
        self.discount_amount += amount;
    }
}
