use rust_decimal::Decimal;

use crate::discount::EngineSettings;

/// Splits `amount` across `weights` in proportion to each weight.
///
/// Every share except the last is rounded toward zero to the minor unit and the
/// last share takes the remainder, so the shares always sum to `amount` exactly
/// and none is negative. A zero total weight uses a denominator of one.
pub fn allocate_proportionally(
    amount: Decimal,
    weights: &[Decimal],
    settings: &EngineSettings,
) -> Vec<Decimal> {
    let Some(last) = weights.len().checked_sub(1) else {
        return Vec::new();
    };

    let total: Decimal = weights.iter().copied().sum();
    let denominator = if total.is_zero() { Decimal::ONE } else { total };

    let mut shares = Vec::with_capacity(weights.len());
    let mut allocated = Decimal::ZERO;
    for weight in &weights[..last] {
        let share = settings.truncate(amount * *weight / denominator);
        allocated += share;
        shares.push(share);
    }
    shares.push(amount - allocated);
    shares
}

/// Splits `amount` across `caps` in proportion to each cap without giving any
/// index more than its cap.
///
/// Shares start at the truncated proportional value. The units lost to
/// truncation go one minor unit at a time to the largest remainders, skipping
/// indices already at their cap. When `amount` covers every cap the caps are
/// returned unchanged.
pub fn allocate_capped(
    amount: Decimal,
    caps: &[Decimal],
    settings: &EngineSettings,
) -> Vec<Decimal> {
    let caps: Vec<Decimal> = caps.iter().map(|cap| (*cap).max(Decimal::ZERO)).collect();
    let total: Decimal = caps.iter().copied().sum();
    if amount >= total {
        return caps;
    }
    if amount <= Decimal::ZERO {
        return vec![Decimal::ZERO; caps.len()];
    }

    let ideals: Vec<Decimal> = caps.iter().map(|cap| amount * *cap / total).collect();
    let mut shares: Vec<Decimal> = ideals.iter().map(|ideal| settings.truncate(*ideal)).collect();
    let mut leftover = amount - shares.iter().copied().sum::<Decimal>();

    let mut order: Vec<usize> = (0..caps.len()).collect();
    order.sort_by(|&left, &right| {
        let left_remainder = ideals[left] - shares[left];
        let right_remainder = ideals[right] - shares[right];
        right_remainder.cmp(&left_remainder).then(left.cmp(&right))
    });

    let unit = settings.minor_unit();
    while leftover > Decimal::ZERO {
        let mut handed_out = false;
        for &index in &order {
            let room = caps[index] - shares[index];
            let give = unit.min(leftover).min(room);
            if give > Decimal::ZERO {
                shares[index] += give;
                leftover -= give;
                handed_out = true;
            }
            if leftover.is_zero() {
                break;
            }
        }
        if !handed_out {
            break;
        }
    }
    shares
}

/// Free units earned by a buy/get ratio: one `get` batch per full bundle.
pub fn free_unit_count(total_quantity: u64, buy_quantity: u32, get_quantity: u32) -> u64 {
    let bundle = u64::from(buy_quantity) + u64::from(get_quantity);
    if bundle == 0 {
        return 0;
    }
    (total_quantity / bundle) * u64::from(get_quantity)
}

/// Hands out free units greedily in the given order, never more than a line's
/// own quantity.
pub fn assign_free_units(quantities: &[u32], free_units: u64) -> Vec<u32> {
    let mut remaining = free_units;
    quantities
        .iter()
        .map(|&quantity| {
            let units = remaining.min(u64::from(quantity));
            remaining -= units;
            u32::try_from(units).unwrap_or(quantity)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{allocate_capped, allocate_proportionally, assign_free_units, free_unit_count};
    use crate::discount::EngineSettings;

    fn dec(value: i64, scale: u32) -> Decimal {
        Decimal::new(value, scale)
    }

    #[test]
    fn fixed_amount_splits_by_line_total() {
        let shares = allocate_proportionally(
            dec(90, 0),
            &[dec(600, 0), dec(300, 0)],
            &EngineSettings::default(),
        );
        assert_eq!(shares, vec![dec(60, 0), dec(30, 0)]);
    }

    #[test]
    fn last_share_absorbs_rounding_remainder() {
        let shares = allocate_proportionally(
            dec(100, 0),
            &[dec(1, 0), dec(1, 0), dec(1, 0)],
            &EngineSettings::default(),
        );
        assert_eq!(shares, vec![dec(3333, 2), dec(3333, 2), dec(3334, 2)]);
        assert_eq!(shares.iter().copied().sum::<Decimal>(), dec(100, 0));
    }

    #[test]
    fn shares_never_go_negative_for_tiny_last_weights() {
        let shares = allocate_proportionally(
            dec(3, 2),
            &[dec(1, 0), dec(1, 0), dec(1, 4)],
            &EngineSettings::default(),
        );
        assert!(shares.iter().all(|share| *share >= Decimal::ZERO));
        assert_eq!(shares.iter().copied().sum::<Decimal>(), dec(3, 2));
    }

    #[test]
    fn zero_total_weight_uses_unit_denominator() {
        let shares = allocate_proportionally(
            dec(5, 0),
            &[Decimal::ZERO, Decimal::ZERO],
            &EngineSettings::default(),
        );
        assert_eq!(shares, vec![Decimal::ZERO, dec(5, 0)]);
    }

    #[test]
    fn empty_weights_allocate_nothing() {
        assert!(allocate_proportionally(dec(5, 0), &[], &EngineSettings::default()).is_empty());
    }

    #[test]
    fn capped_shares_never_exceed_their_caps() {
        let caps = [dec(1, 2), dec(1, 2), dec(1000, 2)];
        let shares = allocate_capped(dec(1001, 2), &caps, &EngineSettings::default());

        assert_eq!(shares, vec![dec(1, 2), dec(1, 2), dec(999, 2)]);
        assert!(shares.iter().zip(caps).all(|(share, cap)| *share <= cap));
    }

    #[test]
    fn capped_leftover_goes_to_largest_remainder() {
        let shares =
            allocate_capped(dec(100, 0), &[dec(60, 0), dec(70, 0)], &EngineSettings::default());
        assert_eq!(shares, vec![dec(4615, 2), dec(5385, 2)]);
    }

    #[test]
    fn capped_amount_covering_every_cap_returns_the_caps() {
        let caps = vec![dec(5, 0), dec(7, 0)];
        assert_eq!(allocate_capped(dec(20, 0), &caps, &EngineSettings::default()), caps);
        assert_eq!(
            allocate_capped(Decimal::ZERO, &caps, &EngineSettings::default()),
            vec![Decimal::ZERO, Decimal::ZERO]
        );
    }

    #[test]
    fn free_units_follow_bundle_ratio() {
        assert_eq!(free_unit_count(2, 1, 1), 1);
        assert_eq!(free_unit_count(3, 2, 1), 1);
        assert_eq!(free_unit_count(1, 2, 1), 0);
        assert_eq!(free_unit_count(7, 2, 1), 2);
        assert_eq!(free_unit_count(10, 3, 2), 4);
        assert_eq!(free_unit_count(10, 0, 0), 0);
    }

    #[test]
    fn free_units_are_assigned_greedily_in_order() {
        assert_eq!(assign_free_units(&[1, 3, 2], 3), vec![1, 2, 0]);
        assert_eq!(assign_free_units(&[2, 2], 10), vec![2, 2]);
        assert_eq!(assign_free_units(&[4], 0), vec![0]);
    }
}
