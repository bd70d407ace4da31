use std::sync::Arc;

use common::UserId;
use domain::OrderStatus;
use order_store::{HistoryQuery, OrderHistoryRecord, OrderStore};

use crate::error::Result;

/// Read-only view of a user's orders.
pub struct OrderHistoryService<S: OrderStore> {
    store: Arc<S>,
}

impl<S: OrderStore> Clone for OrderHistoryService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: OrderStore> OrderHistoryService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns the user's orders newest first, optionally only those in `status`.
    #[tracing::instrument(skip(self))]
    pub async fn list(
        &self,
        user_id: UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<OrderHistoryRecord>> {
        let query = HistoryQuery::for_user(user_id).with_status(status);
        Ok(self.store.list_history(query).await?)
    }
}
