//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{MerchantId, OrderId, OrderNo, UserId};
use serde::{Deserialize, Serialize};

use super::{
    Money, OrderError, OrderItem, OrderStatus, OrderTransition, Recipient, SideEffect,
    TransitionKind, TransitionOutcome, Version,
};

/// Everything needed to place an order.
///
/// Items must already carry catalog snapshots.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub order_no: OrderNo,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub shipping_fee: Money,
    pub discount_amount: Money,
    pub recipient: Recipient,
    pub remark: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Order aggregate root.
///
/// Mutated only through [`Order::apply_transition`], which enforces the
/// transition table. Orders are never deleted; terminal orders stay for
/// audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    order_no: OrderNo,
    user_id: UserId,
    merchant_id: Option<MerchantId>,

    #[serde(default)]
    version: Version,

    status: OrderStatus,
    /// Status recorded when the current refund was requested.
    refund_origin: Option<OrderStatus>,
    /// Set once every line has been deducted from stock. Orders that never
    /// reached this point have nothing to restore.
    stock_deducted: bool,
    /// Set in the same save as the first transition that restores stock.
    stock_restored: bool,

    product_amount: Money,
    shipping_fee: Money,
    discount_amount: Money,
    total_amount: Money,
    payable_amount: Money,
    paid_amount: Money,
    refund_amount: Money,

    payment_id: Option<String>,
    cancel_reason: Option<String>,
    refund_reason: Option<String>,
    logistics_company: Option<String>,
    tracking_no: Option<String>,

    recipient: Recipient,
    remark: Option<String>,
    items: Vec<OrderItem>,

    created_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    confirmed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    refund_applied_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
}

fn set_once<T>(slot: &mut Option<T>, value: T) {
    if slot.is_none() {
        *slot = Some(value);
    }
}

impl Order {
    /// Places a new order in `PENDING`.
    ///
    /// `total = product + shipping - discount` and `payable = total`.
    pub fn place(new: NewOrder) -> Result<Order, OrderError> {
        if new.items.is_empty() {
            return Err(OrderError::NoItems);
        }

        for item in &new.items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: item.product_id,
                    quantity: item.quantity,
                });
            }
            if item.unit_price.is_negative() {
                return Err(OrderError::InvalidAmount {
                    field: "unit_price",
                    amount: item.unit_price,
                });
            }
        }

        if new.shipping_fee.is_negative() {
            return Err(OrderError::InvalidAmount {
                field: "shipping_fee",
                amount: new.shipping_fee,
            });
        }
        if new.discount_amount.is_negative() {
            return Err(OrderError::InvalidAmount {
                field: "discount_amount",
                amount: new.discount_amount,
            });
        }

        let product_amount: Money = new.items.iter().map(|item| item.subtotal).sum();
        let total_amount = product_amount + new.shipping_fee - new.discount_amount;
        if total_amount.is_negative() {
            return Err(OrderError::InvalidAmount {
                field: "total_amount",
                amount: total_amount,
            });
        }

        // A single seller is derivable only when every line agrees.
        let first_merchant = new.items[0].merchant_id;
        let merchant_id = first_merchant
            .filter(|m| new.items.iter().all(|item| item.merchant_id == Some(*m)));

        Ok(Order {
            id: new.id,
            order_no: new.order_no,
            user_id: new.user_id,
            merchant_id,
            version: Version::initial(),
            status: OrderStatus::Pending,
            refund_origin: None,
            stock_deducted: false,
            stock_restored: false,
            product_amount,
            shipping_fee: new.shipping_fee,
            discount_amount: new.discount_amount,
            total_amount,
            payable_amount: total_amount,
            paid_amount: Money::zero(),
            refund_amount: Money::zero(),
            payment_id: None,
            cancel_reason: None,
            refund_reason: None,
            logistics_company: None,
            tracking_no: None,
            recipient: new.recipient,
            remark: new.remark,
            items: new.items,
            created_at: new.created_at,
            paid_at: None,
            shipped_at: None,
            confirmed_at: None,
            cancelled_at: None,
            refund_applied_at: None,
            refunded_at: None,
        })
    }

    /// Applies a transition if the table allows it from the current status.
    ///
    /// On success the order is mutated and the returned outcome lists the
    /// side effects and events the caller owes once the change is persisted.
    /// On failure the order is untouched.
    pub fn apply_transition(
        &mut self,
        transition: OrderTransition,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, OrderError> {
        let kind = transition.kind();
        let from = self.status;
        let to = kind
            .target(from, self.refund_origin)
            .ok_or(OrderError::InvalidState {
                current: from,
                action: kind.action(),
            })?;

        let mut effects = Vec::new();

        match transition {
            OrderTransition::Pay { payment_id } => {
                self.payment_id = Some(payment_id);
                self.paid_amount = self.payable_amount;
                set_once(&mut self.paid_at, now);
            }
            OrderTransition::Cancel { reason } | OrderTransition::SweepCancel { reason } => {
                if from == OrderStatus::Paid {
                    effects.push(SideEffect::Refund {
                        amount: self.paid_amount,
                        reason: reason.clone(),
                    });
                }
                set_once(&mut self.cancel_reason, reason);
                set_once(&mut self.cancelled_at, now);
            }
            OrderTransition::Ship {
                carrier,
                tracking_no,
            } => {
                set_once(&mut self.logistics_company, carrier);
                set_once(&mut self.tracking_no, tracking_no);
                set_once(&mut self.shipped_at, now);
            }
            OrderTransition::Confirm | OrderTransition::SweepConfirm => {
                set_once(&mut self.confirmed_at, now);
            }
            OrderTransition::RequestRefund { reason } => {
                self.refund_origin = Some(from);
                effects.push(SideEffect::Refund {
                    amount: self.payable_amount,
                    reason: reason.clone(),
                });
                self.refund_reason = Some(reason);
                set_once(&mut self.refund_applied_at, now);
            }
            OrderTransition::ApproveRefund => {
                self.refund_amount = self.payable_amount;
                self.payable_amount = self.total_amount - self.refund_amount;
                self.refund_origin = None;
                set_once(&mut self.refunded_at, now);
            }
            OrderTransition::RejectRefund { .. } | OrderTransition::RevertRefund => {
                self.refund_origin = None;
            }
        }

        if matches!(
            kind,
            TransitionKind::Cancel | TransitionKind::SweepCancel | TransitionKind::ApproveRefund
        ) && self.stock_deducted
            && !self.stock_restored
        {
            self.stock_restored = true;
            effects.insert(0, SideEffect::RestoreStock);
        }

        self.status = to;

        Ok(TransitionOutcome {
            kind,
            from,
            to,
            effects,
            events: kind.events(to),
        })
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn order_no(&self) -> &OrderNo {
        &self.order_no
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn merchant_id(&self) -> Option<MerchantId> {
        self.merchant_id
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Called by the repository after a successful save.
    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// Records that every line has left stock. Only a PENDING order can be
    /// marked; later cancellations and approved refunds restore stock only
    /// once this is set.
    pub fn mark_stock_deducted(&mut self) -> Result<(), OrderError> {
        if self.status != OrderStatus::Pending {
            return Err(OrderError::InvalidState {
                current: self.status,
                action: "mark stock deducted",
            });
        }
        self.stock_deducted = true;
        Ok(())
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn refund_origin(&self) -> Option<OrderStatus> {
        self.refund_origin
    }

    pub fn stock_deducted(&self) -> bool {
        self.stock_deducted
    }

    pub fn stock_restored(&self) -> bool {
        self.stock_restored
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    pub fn product_amount(&self) -> Money {
        self.product_amount
    }

    pub fn shipping_fee(&self) -> Money {
        self.shipping_fee
    }

    pub fn discount_amount(&self) -> Money {
        self.discount_amount
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn payable_amount(&self) -> Money {
        self.payable_amount
    }

    pub fn paid_amount(&self) -> Money {
        self.paid_amount
    }

    pub fn refund_amount(&self) -> Money {
        self.refund_amount
    }

    pub fn payment_id(&self) -> Option<&str> {
        self.payment_id.as_deref()
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    pub fn refund_reason(&self) -> Option<&str> {
        self.refund_reason.as_deref()
    }

    pub fn logistics_company(&self) -> Option<&str> {
        self.logistics_company.as_deref()
    }

    pub fn tracking_no(&self) -> Option<&str> {
        self.tracking_no.as_deref()
    }

    pub fn recipient(&self) -> &Recipient {
        &self.recipient
    }

    pub fn remark(&self) -> Option<&str> {
        self.remark.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn shipped_at(&self) -> Option<DateTime<Utc>> {
        self.shipped_at
    }

    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn refund_applied_at(&self) -> Option<DateTime<Utc>> {
        self.refund_applied_at
    }

    pub fn refunded_at(&self) -> Option<DateTime<Utc>> {
        self.refunded_at
    }
}
