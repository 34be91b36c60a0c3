//! Read-only view of a customer's cart.
//!
//! Carts are owned by the cart service; the fulfillment core only reads them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::order::{CustomerId, Money, ProductId};

/// One product line of a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub quantity: u32,
    pub unit_price: Money,
    /// Always `quantity * unit_price`.
    pub line_total: Money,
}

impl CartLine {
    pub fn new(quantity: u32, unit_price: Money) -> Self {
        Self {
            quantity,
            unit_price,
            line_total: unit_price.multiply(quantity),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub customer_id: CustomerId,
    lines: BTreeMap<ProductId, CartLine>,
    total: Money,
}

impl Cart {
    pub fn new(customer_id: CustomerId) -> Self {
        Self {
            customer_id,
            lines: BTreeMap::new(),
            total: Money::zero(),
        }
    }

    /// Sets the line for a product, replacing any previous line.
    pub fn add_line(&mut self, product_id: impl Into<ProductId>, quantity: u32, unit_price: Money) {
        self.lines
            .insert(product_id.into(), CartLine::new(quantity, unit_price));
        self.total = self.lines.values().map(|l| l.line_total).sum();
    }

    pub fn with_line(mut self, product_id: impl Into<ProductId>, quantity: u32, unit_price: Money) -> Self {
        self.add_line(product_id, quantity, unit_price);
        self
    }

    /// Lines in product id order.
    pub fn lines(&self) -> impl Iterator<Item = (&ProductId, &CartLine)> {
        self.lines.iter()
    }

    pub fn line(&self, product_id: &ProductId) -> Option<&CartLine> {
        self.lines.get(product_id)
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_total_is_quantity_times_price() {
        let line = CartLine::new(3, Money::from_cents(250));
        assert_eq!(line.line_total.cents(), 750);
    }

    #[test]
    fn test_running_total_tracks_lines() {
        let mut cart = Cart::new(CustomerId::new())
            .with_line("SKU-A", 2, Money::from_cents(1000))
            .with_line("SKU-B", 1, Money::from_cents(2500));
        assert_eq!(cart.total().cents(), 4500);

        cart.add_line("SKU-A", 1, Money::from_cents(1000));
        assert_eq!(cart.total().cents(), 3500);
        assert_eq!(cart.len(), 2);
    }

    #[test]
    fn test_new_cart_is_empty() {
        let cart = Cart::new(CustomerId::new());
        assert!(cart.is_empty());
        assert_eq!(cart.total(), Money::zero());
    }
}
