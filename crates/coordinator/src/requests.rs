//! Request and result types for coordinator operations.

use chrono::{DateTime, Utc};
use common::{OrderNo, ProductId, UserId};
use domain::{Money, Order, OrderStatus, Recipient};
use serde::{Deserialize, Serialize};

/// One line of a create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Chosen variant, e.g. "red / XL".
    pub spec: Option<String>,
}

impl OrderLineRequest {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
            spec: None,
        }
    }

    pub fn with_spec(mut self, spec: impl Into<String>) -> Self {
        self.spec = Some(spec.into());
        self
    }
}

/// Input for order creation. Prices come from the catalog, never from here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: UserId,
    pub items: Vec<OrderLineRequest>,
    pub shipping_fee: Money,
    pub discount_amount: Money,
    pub recipient: Recipient,
    pub remark: Option<String>,
}

impl CreateOrderRequest {
    pub fn new(user_id: UserId, items: Vec<OrderLineRequest>) -> Self {
        Self {
            user_id,
            items,
            shipping_fee: Money::zero(),
            discount_amount: Money::zero(),
            recipient: Recipient::default(),
            remark: None,
        }
    }

    pub fn with_shipping_fee(mut self, fee: Money) -> Self {
        self.shipping_fee = fee;
        self
    }

    pub fn with_discount(mut self, discount: Money) -> Self {
        self.discount_amount = discount;
        self
    }

    pub fn with_recipient(mut self, recipient: Recipient) -> Self {
        self.recipient = recipient;
        self
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }
}

/// Result of a payment callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The order moved to PAID.
    Applied(Order),
    /// The order had already left PENDING; nothing changed.
    AlreadyProcessed(OrderStatus),
}

impl PaymentOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, PaymentOutcome::Applied(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogisticsTrack {
    pub at: DateTime<Utc>,
    pub status: String,
    pub description: String,
}

/// Shipment details visible to the buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Logistics {
    pub order_no: OrderNo,
    pub carrier: Option<String>,
    pub tracking_no: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    /// Newest first.
    pub tracks: Vec<LogisticsTrack>,
}

impl Logistics {
    pub(crate) fn for_order(order: &Order) -> Self {
        let mut tracks = Vec::new();

        if let Some(shipped_at) = order.shipped_at() {
            tracks.push(LogisticsTrack {
                at: shipped_at,
                status: "shipped".to_string(),
                description: match order.logistics_company() {
                    Some(carrier) => format!("Handed over to {carrier}"),
                    None => "Handed over to carrier".to_string(),
                },
            });
        }

        if order.status() == OrderStatus::Completed {
            tracks.insert(
                0,
                LogisticsTrack {
                    at: order.confirmed_at().unwrap_or_else(Utc::now),
                    status: "delivered".to_string(),
                    description: "Delivered and confirmed".to_string(),
                },
            );
        }

        Self {
            order_no: order.order_no().clone(),
            carrier: order.logistics_company().map(str::to_string),
            tracking_no: order.tracking_no().map(str::to_string),
            shipped_at: order.shipped_at(),
            tracks,
        }
    }
}

/// Outcome of one compensation replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompensationReport {
    pub succeeded: usize,
    pub failed: usize,
}
