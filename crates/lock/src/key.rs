use common::{OrderId, OrderNo, UserId};

/// Lock names, one per concern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockKey {
    /// Serializes order creation per buyer.
    Create(UserId),
    Cancel(OrderId),
    /// Keyed by order number because payment callbacks only carry that.
    Pay(OrderNo),
    Status(OrderId),
    TimeoutSweep,
    AutoConfirmSweep,
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockKey::Create(user_id) => write!(f, "order:create:{user_id}"),
            LockKey::Cancel(order_id) => write!(f, "order:cancel:{order_id}"),
            LockKey::Pay(order_no) => write!(f, "order:pay:{order_no}"),
            LockKey::Status(order_id) => write!(f, "order:status:{order_id}"),
            LockKey::TimeoutSweep => f.write_str("order:task:timeout"),
            LockKey::AutoConfirmSweep => f.write_str("order:task:auto-confirm"),
        }
    }
}
