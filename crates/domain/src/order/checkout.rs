//! Checkout requests: validation and the derived order summary.

use std::collections::HashSet;

use common::UserId;
use serde::{Deserialize, Serialize};

use super::{CheckoutItem, MAX_QUANTITY, MIN_QUANTITY, OrderError};

/// Longest payment method accepted, in characters.
pub const MAX_PAYMENT_METHOD_LEN: usize = 50;

/// A checkout submitted by an authenticated caller.
///
/// `user_id` comes from the transport's caller identity, never from the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub items: Vec<CheckoutItem>,
    pub payment_method: String,
    pub shipping_address: String,
    /// Client-supplied deduplication token. Empty or absent disables dedup.
    #[serde(default)]
    pub idempotency_token: Option<String>,
}

impl CheckoutRequest {
    /// Creates a request without an idempotency token.
    pub fn new(
        user_id: UserId,
        items: Vec<CheckoutItem>,
        payment_method: impl Into<String>,
        shipping_address: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            items,
            payment_method: payment_method.into(),
            shipping_address: shipping_address.into(),
            idempotency_token: None,
        }
    }

    /// Sets the idempotency token.
    pub fn with_idempotency_token(mut self, token: impl Into<String>) -> Self {
        self.idempotency_token = Some(token.into());
        self
    }

    /// Returns the token as supplied, unless it is absent or blank.
    pub fn token(&self) -> Option<&str> {
        self.idempotency_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
    }

    /// Checks the item list, then the payment method, stopping at the first
    /// violation.
    ///
    /// Items are checked in request order; for each item the duplicate check
    /// runs before the quantity and price checks.
    pub fn validate(&self) -> Result<(), OrderError> {
        validate_items(&self.items)?;

        let length = self.payment_method.chars().count();
        if length > MAX_PAYMENT_METHOD_LEN {
            return Err(OrderError::PaymentMethodTooLong { length });
        }
        Ok(())
    }

    /// Computes the totals stored on the order header.
    pub fn summary(&self) -> CheckoutSummary {
        CheckoutSummary::of(&self.items)
    }
}

/// Validates a list of checkout items.
pub fn validate_items(items: &[CheckoutItem]) -> Result<(), OrderError> {
    if items.is_empty() {
        return Err(OrderError::NoItems);
    }

    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        if !seen.insert(item.product_id) {
            return Err(OrderError::DuplicateProduct {
                product_id: item.product_id,
            });
        }

        if !(MIN_QUANTITY..=MAX_QUANTITY).contains(&item.quantity) {
            return Err(OrderError::InvalidQuantity {
                product_id: item.product_id,
                quantity: item.quantity,
            });
        }

        // NaN fails the comparison as well.
        if !(item.price > 0.0) || !item.price.is_finite() {
            return Err(OrderError::InvalidPrice {
                product_id: item.product_id,
                price: item.price,
            });
        }
    }

    Ok(())
}

/// Totals derived from the line items.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckoutSummary {
    /// Sum of quantities.
    pub total_qty: i64,
    /// Sum of `price * quantity`, accumulated in item order.
    pub total_amount: f64,
}

impl CheckoutSummary {
    pub fn of(items: &[CheckoutItem]) -> Self {
        items.iter().fold(
            CheckoutSummary {
                total_qty: 0,
                total_amount: 0.0,
            },
            |acc, item| CheckoutSummary {
                total_qty: acc.total_qty + i64::from(item.quantity),
                total_amount: acc.total_amount + item.line_total(),
            },
        )
    }
}
