use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Stable identifier for a sellable product variant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sku(pub String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Case-insensitive form used for allow-list membership.
    pub fn normalized(&self) -> String {
        self.0.trim().to_ascii_uppercase()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Sku {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineItem {
    pub sku: Sku,
    pub quantity: u32,
    /// List price.
    pub unit_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<Decimal>,
}

impl CartLineItem {
    pub fn new(sku: impl Into<String>, quantity: u32, unit_price: Decimal) -> Self {
        Self { sku: Sku::new(sku), quantity, unit_price, sale_price: None }
    }

    pub fn with_sale_price(mut self, sale_price: Decimal) -> Self {
        self.sale_price = Some(sale_price);
        self
    }
}

/// Cart lines in the order the shopper added them. Order is significant for
/// greedy free-unit assignment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub lines: Vec<CartLineItem>,
}

impl CartSnapshot {
    pub fn new(lines: Vec<CartLineItem>) -> Self {
        Self { lines }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|line| line.quantity == 0)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{CartLineItem, CartSnapshot, Sku};

    #[test]
    fn sku_normalization_ignores_case_and_padding() {
        assert_eq!(Sku::new(" tee-red-m ").normalized(), "TEE-RED-M");
    }

    #[test]
    fn cart_snapshot_deserializes_without_sale_price() {
        let cart: CartSnapshot = serde_json::from_str(
            r#"{"lines":[{"sku":"A","quantity":2,"unit_price":"300.00"}]}"#,
        )
        .expect("cart json");

        assert_eq!(cart.lines, vec![CartLineItem::new("A", 2, Decimal::new(30_000, 2))]);
        assert!(!cart.is_empty());
    }

    #[test]
    fn zero_quantity_cart_counts_as_empty() {
        let cart = CartSnapshot::new(vec![CartLineItem::new("A", 0, Decimal::ONE)]);
        assert!(cart.is_empty());
    }
}
