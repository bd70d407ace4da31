//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Created ──► Processing ──► Completed
///    │            │
///    │            └──► Cancelled | Failed
///    │
///    ├──────────────────► Completed
///    └──────────────────► Cancelled | Failed
/// ```
///
/// Statuses are persisted as their numeric code and exposed to clients by label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Order has been persisted, payment not yet settled.
    #[default]
    Created,

    /// Payment is being processed.
    Processing,

    /// Payment settled (terminal state).
    Completed,

    /// Order was cancelled (terminal state).
    Cancelled,

    /// Order could not be fulfilled (terminal state).
    Failed,
}

impl OrderStatus {
    /// All statuses, in code order.
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Created,
        OrderStatus::Processing,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Failed,
    ];

    /// Returns the numeric code stored in the `orders.status` column.
    pub const fn code(&self) -> i16 {
        match self {
            OrderStatus::Created => 0,
            OrderStatus::Processing => 1,
            OrderStatus::Completed => 2,
            OrderStatus::Cancelled => 3,
            OrderStatus::Failed => 4,
        }
    }

    /// Parses a stored status code.
    pub fn from_code(code: i16) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }

    /// Returns the lowercase label used in API responses and history entries.
    pub const fn label(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Failed => "failed",
        }
    }

    /// Returns true if `next` is a legal forward transition from this status.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Created, Processing)
                | (Created | Processing, Completed)
                | (Created | Processing, Cancelled)
                | (Created | Processing, Failed)
        )
    }

    /// Returns the statuses from which `self` can be entered.
    pub fn predecessors(&self) -> Vec<OrderStatus> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(*self))
            .collect()
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Failed
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Error returned when parsing an unknown status label or code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl std::str::FromStr for OrderStatus {
    type Err = UnknownStatus;

    /// Accepts either the label (`"completed"`) or the numeric code (`"2"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<i16>() {
            return Self::from_code(code).ok_or_else(|| UnknownStatus(s.to_string()));
        }
        Self::ALL
            .into_iter()
            .find(|status| status.label().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}
