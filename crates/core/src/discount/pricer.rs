use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::cart::{CartLineItem, CartSnapshot, Sku};

/// A cart line with its resolved price. `position` is the line's index in the
/// cart and preserves input order through filtering.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub position: usize,
    pub sku: Sku,
    pub quantity: u32,
    pub effective_unit_price: Decimal,
    pub line_total: Decimal,
}

/// Sale price wins only when it is set and strictly positive.
pub fn effective_unit_price(line: &CartLineItem) -> Decimal {
    match line.sale_price {
        Some(sale_price) if sale_price > Decimal::ZERO => sale_price,
        _ => line.unit_price,
    }
}

pub fn price_line(position: usize, line: &CartLineItem) -> PricedLine {
    let effective_unit_price = effective_unit_price(line);
    let line_total = if line.quantity == 0 {
        Decimal::ZERO
    } else {
        effective_unit_price * Decimal::from(line.quantity)
    };

    PricedLine {
        position,
        sku: line.sku.clone(),
        quantity: line.quantity,
        effective_unit_price,
        line_total,
    }
}

pub fn price_cart(cart: &CartSnapshot) -> Vec<PricedLine> {
    cart.lines.iter().enumerate().map(|(position, line)| price_line(position, line)).collect()
}

pub fn subtotal<'a>(lines: impl IntoIterator<Item = &'a PricedLine>) -> Decimal {
    lines.into_iter().map(|line| line.line_total).sum()
}
