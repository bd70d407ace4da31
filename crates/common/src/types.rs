use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw database identifier.
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw identifier.
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

numeric_id!(
    /// Identifier of a persisted order.
    ///
    /// Assigned by the store on insert and strictly increasing, so ordering by
    /// id is ordering by creation.
    OrderId
);

numeric_id!(
    /// Identifier of the detail row (line-item snapshot and status history)
    /// owned by exactly one order.
    DetailId
);

numeric_id!(
    /// Identifier of the authenticated caller that owns an order.
    UserId
);

numeric_id!(
    /// Catalog identifier of a product.
    ProductId
);

impl OrderId {
    /// Bus partition key shared by every event about this order.
    ///
    /// All events for one order land on the same partition, so downstream
    /// consumers observe them in publish order.
    pub fn partition_key(&self) -> String {
        format!("order-{}", self.0)
    }
}
