//! Executable transition table.
//!
//! Every status change goes through [`TransitionKind::target`], so the table
//! below is the single place that decides which (status, event) pairs exist:
//!
//! | From | Event | To |
//! |---|---|---|
//! | PENDING | pay | PAID |
//! | PENDING, PAID | cancel | CANCELLED |
//! | PAID | ship | SHIPPED |
//! | SHIPPED | confirm | COMPLETED |
//! | PAID, SHIPPED, COMPLETED | request-refund | REFUND_PENDING |
//! | REFUND_PENDING | refund-approved | REFUNDED |
//! | REFUND_PENDING | refund-rejected, refund-reverted | status before the request |
//! | PENDING | sweep-cancel | CANCELLED |
//! | SHIPPED | sweep-confirm | COMPLETED |

use serde::{Deserialize, Serialize};

use super::{Money, OrderEventType, OrderStatus};

/// The event driving a transition, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionKind {
    Pay,
    Cancel,
    Ship,
    Confirm,
    RequestRefund,
    ApproveRefund,
    RejectRefund,
    /// Compensation when the payment collaborator refuses a refund request.
    RevertRefund,
    SweepCancel,
    SweepConfirm,
}

impl TransitionKind {
    pub const ALL: [TransitionKind; 10] = [
        TransitionKind::Pay,
        TransitionKind::Cancel,
        TransitionKind::Ship,
        TransitionKind::Confirm,
        TransitionKind::RequestRefund,
        TransitionKind::ApproveRefund,
        TransitionKind::RejectRefund,
        TransitionKind::RevertRefund,
        TransitionKind::SweepCancel,
        TransitionKind::SweepConfirm,
    ];

    /// Returns the status reached from `from`, or `None` if the pair is
    /// undefined.
    ///
    /// `refund_origin` is the status recorded when the refund was requested;
    /// leaving REFUND_PENDING without approval returns there.
    pub fn target(
        self,
        from: OrderStatus,
        refund_origin: Option<OrderStatus>,
    ) -> Option<OrderStatus> {
        use OrderStatus::*;
        use TransitionKind::*;

        match (self, from) {
            (Pay, Pending) => Some(Paid),
            (Cancel, Pending | Paid) => Some(Cancelled),
            (Ship, Paid) => Some(Shipped),
            (Confirm, Shipped) => Some(Completed),
            (RequestRefund, Paid | Shipped | Completed) => Some(RefundPending),
            (ApproveRefund, RefundPending) => Some(Refunded),
            (RejectRefund | RevertRefund, RefundPending) => {
                refund_origin.filter(|origin| origin.can_refund())
            }
            (SweepCancel, Pending) => Some(Cancelled),
            (SweepConfirm, Shipped) => Some(Completed),
            _ => None,
        }
    }

    /// Verb used in invalid-state errors.
    pub fn action(self) -> &'static str {
        match self {
            TransitionKind::Pay => "pay",
            TransitionKind::Cancel => "cancel",
            TransitionKind::Ship => "ship",
            TransitionKind::Confirm => "confirm",
            TransitionKind::RequestRefund => "request refund",
            TransitionKind::ApproveRefund => "approve refund",
            TransitionKind::RejectRefund => "reject refund",
            TransitionKind::RevertRefund => "revert refund",
            TransitionKind::SweepCancel => "cancel on payment timeout",
            TransitionKind::SweepConfirm => "auto-confirm",
        }
    }

    /// Events published after the transition commits, in publication order.
    pub fn events(self, to: OrderStatus) -> Vec<OrderEventType> {
        match self {
            TransitionKind::SweepCancel => {
                vec![OrderEventType::OrderTimeout, OrderEventType::OrderCancelled]
            }
            TransitionKind::RejectRefund => vec![OrderEventType::RefundRejected],
            TransitionKind::RevertRefund => Vec::new(),
            _ => OrderEventType::for_status(to).into_iter().collect(),
        }
    }
}

impl std::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.action())
    }
}

/// A transition request together with the data it records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderTransition {
    Pay { payment_id: String },
    Cancel { reason: String },
    Ship { carrier: String, tracking_no: String },
    Confirm,
    RequestRefund { reason: String },
    ApproveRefund,
    RejectRefund { reason: Option<String> },
    RevertRefund,
    SweepCancel { reason: String },
    SweepConfirm,
}

impl OrderTransition {
    pub fn kind(&self) -> TransitionKind {
        match self {
            OrderTransition::Pay { .. } => TransitionKind::Pay,
            OrderTransition::Cancel { .. } => TransitionKind::Cancel,
            OrderTransition::Ship { .. } => TransitionKind::Ship,
            OrderTransition::Confirm => TransitionKind::Confirm,
            OrderTransition::RequestRefund { .. } => TransitionKind::RequestRefund,
            OrderTransition::ApproveRefund => TransitionKind::ApproveRefund,
            OrderTransition::RejectRefund { .. } => TransitionKind::RejectRefund,
            OrderTransition::RevertRefund => TransitionKind::RevertRefund,
            OrderTransition::SweepCancel { .. } => TransitionKind::SweepCancel,
            OrderTransition::SweepConfirm => TransitionKind::SweepConfirm,
        }
    }
}

/// Work the coordinator must perform after a transition is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    /// Return every item's quantity to stock. Issued at most once per order.
    RestoreStock,

    /// Ask the payment collaborator to refund.
    Refund { amount: Money, reason: String },
}

/// What a successfully applied transition did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub kind: TransitionKind,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub effects: Vec<SideEffect>,
    pub events: Vec<OrderEventType>,
}

impl TransitionOutcome {
    pub fn restores_stock(&self) -> bool {
        self.effects.contains(&SideEffect::RestoreStock)
    }

    pub fn refund(&self) -> Option<(Money, &str)> {
        self.effects.iter().find_map(|effect| match effect {
            SideEffect::Refund { amount, reason } => Some((*amount, reason.as_str())),
            SideEffect::RestoreStock => None,
        })
    }
}
