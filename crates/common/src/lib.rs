//! Identifier types shared by every crate of the order checkout service.

mod types;

pub use types::{DetailId, OrderId, ProductId, UserId};
