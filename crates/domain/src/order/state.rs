//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
///            ┌──────────────► Cancelled
///            │                   ▲
/// Pending ───┴──► Paid ──────────┤
///                  │             │
///                  ├──► Shipped ──► Completed
///                  │       │           │
///                  ▼       ▼           ▼
///              RefundPending ◄─────────┘
///                  │
///                  ├──► Refunded
///                  └──► (status before the refund request)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created, awaiting payment.
    #[default]
    Pending,

    /// Payment confirmed.
    Paid,

    /// Handed to the carrier.
    Shipped,

    /// Receipt confirmed by the buyer or by the auto-confirm sweep (terminal).
    Completed,

    /// Cancelled by the buyer, an administrator or the timeout sweep (terminal).
    Cancelled,

    /// Refund requested, awaiting a decision.
    RefundPending,

    /// Refund approved and settled (terminal).
    Refunded,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Shipped,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::RefundPending,
        OrderStatus::Refunded,
    ];

    /// Returns true if the order can be cancelled in this status.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Paid)
    }

    /// Returns true if the order can be paid in this status.
    pub fn can_pay(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if the order can be shipped in this status.
    pub fn can_ship(&self) -> bool {
        matches!(self, OrderStatus::Paid)
    }

    /// Returns true if receipt can be confirmed in this status.
    pub fn can_confirm(&self) -> bool {
        matches!(self, OrderStatus::Shipped)
    }

    /// Returns true if a refund can be requested in this status.
    pub fn can_refund(&self) -> bool {
        matches!(
            self,
            OrderStatus::Paid | OrderStatus::Shipped | OrderStatus::Completed
        )
    }

    /// Returns true if a pending refund can be decided in this status.
    pub fn can_decide_refund(&self) -> bool {
        matches!(self, OrderStatus::RefundPending)
    }

    /// Returns true if logistics information exists in this status.
    pub fn can_view_logistics(&self) -> bool {
        matches!(self, OrderStatus::Shipped | OrderStatus::Completed)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::RefundPending => "REFUND_PENDING",
            OrderStatus::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown order status: {s}"))
    }
}
