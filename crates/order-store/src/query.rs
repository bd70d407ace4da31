use common::UserId;
use domain::OrderStatus;

/// Filter for a user's order history.
///
/// Results are ordered newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    pub user_id: UserId,

    /// Only orders currently in this status.
    pub status: Option<OrderStatus>,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,
}

impl HistoryQuery {
    /// Creates a query for all of a user's orders.
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id,
            status: None,
            limit: None,
        }
    }

    /// Restricts the query to one status.
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets an optional status filter.
    pub fn with_status(mut self, status: Option<OrderStatus>) -> Self {
        self.status = status;
        self
    }

    /// Limits the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if an order with this owner and status matches.
    pub fn matches(&self, user_id: UserId, status: OrderStatus) -> bool {
        self.user_id == user_id && self.status.is_none_or(|wanted| wanted == status)
    }
}
