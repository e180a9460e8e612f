//! Guards run before any order mutation.
//!
//! Ownership failures and invalid-state failures are reported as distinct
//! [`OrderError`] variants so callers can map them separately.

use common::UserId;

use super::{Order, OrderError};

/// Fails unless `user_id` owns the order.
pub fn is_owner(order: &Order, user_id: UserId) -> Result<(), OrderError> {
    if order.user_id() != user_id {
        tracing::warn!(
            order_id = %order.id(),
            owner = %order.user_id(),
            caller = %user_id,
            "Order ownership check failed"
        );
        return Err(OrderError::PermissionDenied {
            order_id: order.id(),
            user_id,
        });
    }
    Ok(())
}

fn require(order: &Order, allowed: bool, action: &'static str) -> Result<(), OrderError> {
    if !allowed {
        tracing::warn!(
            order_id = %order.id(),
            status = %order.status(),
            action,
            "Order is not in a valid state for action"
        );
        return Err(OrderError::InvalidState {
            current: order.status(),
            action,
        });
    }
    Ok(())
}

pub fn can_cancel(order: &Order) -> Result<(), OrderError> {
    require(order, order.status().can_cancel(), "cancel")
}

pub fn can_pay(order: &Order) -> Result<(), OrderError> {
    require(order, order.status().can_pay(), "pay")
}

pub fn can_ship(order: &Order) -> Result<(), OrderError> {
    require(order, order.status().can_ship(), "ship")
}

pub fn can_confirm(order: &Order) -> Result<(), OrderError> {
    require(order, order.status().can_confirm(), "confirm")
}

pub fn can_refund(order: &Order) -> Result<(), OrderError> {
    require(order, order.status().can_refund(), "request refund")
}

pub fn can_decide_refund(order: &Order) -> Result<(), OrderError> {
    require(order, order.status().can_decide_refund(), "decide refund")
}

pub fn can_view_logistics(order: &Order) -> Result<(), OrderError> {
    require(order, order.status().can_view_logistics(), "view logistics")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{Money, NewOrder, OrderItem, OrderStatus, OrderTransition, Recipient};
    use chrono::Utc;
    use common::{OrderId, OrderNo, ProductId};

    fn order_for(user: i64) -> Order {
        Order::place(NewOrder {
            id: OrderId::new(1),
            order_no: OrderNo::new("ORD1"),
            user_id: UserId::new(user),
            items: vec![OrderItem::new(
                ProductId::new(1),
                "Widget",
                Money::from_cents(100),
                1,
            )],
            shipping_fee: Money::zero(),
            discount_amount: Money::zero(),
            recipient: Recipient::default(),
            remark: None,
            created_at: Utc::now(),
        })
        .unwrap()
    }

    #[test]
    fn test_owner_passes() {
        assert!(is_owner(&order_for(5), UserId::new(5)).is_ok());
    }

    #[test]
    fn test_foreign_user_is_permission_error_not_state_error() {
        let err = is_owner(&order_for(5), UserId::new(6)).unwrap_err();
        assert!(matches!(err, OrderError::PermissionDenied { .. }));
    }

    #[test]
    fn test_state_guards_on_pending_order() {
        let order = order_for(5);

        assert!(can_cancel(&order).is_ok());
        assert!(can_pay(&order).is_ok());
        assert!(matches!(
            can_confirm(&order),
            Err(OrderError::InvalidState {
                current: OrderStatus::Pending,
                action: "confirm"
            })
        ));
        assert!(can_refund(&order).is_err());
        assert!(can_view_logistics(&order).is_err());
        assert!(can_ship(&order).is_err());
    }

    #[test]
    fn test_state_guards_on_paid_order() {
        let mut order = order_for(5);
        order
            .apply_transition(
                OrderTransition::Pay {
                    payment_id: "P".to_string(),
                },
                Utc::now(),
            )
            .unwrap();

        assert!(can_cancel(&order).is_ok());
        assert!(can_refund(&order).is_ok());
        assert!(can_ship(&order).is_ok());
        assert!(can_pay(&order).is_err());
        assert!(can_decide_refund(&order).is_err());
    }
}
