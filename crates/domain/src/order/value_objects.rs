//! Value objects for the order domain.

use common::ProductId;
use serde::{Deserialize, Serialize};

/// Smallest quantity accepted for a single line item.
pub const MIN_QUANTITY: i32 = 1;

/// Largest quantity accepted for a single line item.
pub const MAX_QUANTITY: i32 = 1000;

/// One line of a checkout request, frozen into the order snapshot as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub product_id: ProductId,
    pub quantity: i32,
    /// Unit price at checkout time.
    pub price: f64,
}

impl CheckoutItem {
    /// Creates a new checkout item.
    pub fn new(product_id: ProductId, quantity: i32, price: f64) -> Self {
        Self {
            product_id,
            quantity,
            price,
        }
    }

    /// Returns `price * quantity`.
    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }

    /// Projects the item onto the stock-movement shape used by downstream services.
    pub fn to_product_item(&self) -> ProductItem {
        ProductItem {
            product_id: self.product_id,
            quantity: self.quantity,
        }
    }
}

/// A product and the quantity that left stock, as carried by stock events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductItem {
    pub product_id: ProductId,
    pub quantity: i32,
}
