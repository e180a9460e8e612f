//! Integration tests for the order lifecycle coordinator.

mod harness;

use std::time::Duration;

use chrono::Utc;
use common::{OrderId, ProductId};
use coordinator::{
    CoordinatorError, CreateOrderRequest, ErrorKind, OrderLineRequest, PaymentOutcome,
};
use domain::{Money, OrderError, OrderEventType, OrderStatus, Recipient, TransitionKind};
use harness::{BUYER, GADGET, OTHER_BUYER, TestHarness, WIDGET};
use lock::CoordinationStore;

// ---- create ----

#[tokio::test]
async fn test_create_snapshots_prices_and_deducts_stock() {
    let h = TestHarness::new();

    let request = TestHarness::basket()
        .with_shipping_fee(Money::from_cents(500))
        .with_discount(Money::from_cents(200))
        .with_recipient(Recipient {
            name: Some("Ada".to_string()),
            phone: None,
            address: Some("1 Main St".to_string()),
        })
        .with_remark("leave at door");
    let order = h.coordinator.create(request).await.unwrap();

    assert_eq!(order.status(), OrderStatus::Pending);
    assert!(order.order_no().as_str().starts_with("ORD"));
    assert_eq!(order.product_amount(), Money::from_cents(4500));
    assert_eq!(order.total_amount(), Money::from_cents(4800));
    assert_eq!(order.payable_amount(), Money::from_cents(4800));
    assert_eq!(order.items()[1].product_image.as_deref(), Some("gadget.png"));
    assert_eq!(order.items()[1].product_spec.as_deref(), Some("blue"));
    assert_eq!(order.remark(), Some("leave at door"));

    assert_eq!(h.products.stock_of(WIDGET), 8);
    assert_eq!(h.products.stock_of(GADGET), 4);
    assert_eq!(h.cart.clear_count(BUYER), 1);
    assert_eq!(h.sink.types_for(order.id()), vec![OrderEventType::OrderCreated]);
    assert_eq!(h.metrics.created_count(), 1);
    assert_eq!(h.reload(order.id()).await, order);
}

#[tokio::test]
async fn test_create_uses_catalog_price_at_purchase_time() {
    let h = TestHarness::new();
    let first = h.create().await;

    h.products.set_price(WIDGET, Money::from_cents(1200));
    let second = h.create().await;

    assert_eq!(first.items()[0].unit_price, Money::from_cents(1000));
    assert_eq!(second.items()[0].unit_price, Money::from_cents(1200));
    assert_eq!(h.reload(first.id()).await.total_amount(), Money::from_cents(4500));
}

#[tokio::test]
async fn test_create_rejects_empty_request() {
    let h = TestHarness::new();

    let err = h
        .coordinator
        .create(CreateOrderRequest::new(BUYER, Vec::new()))
        .await
        .unwrap_err();

    assert!(matches!(err, CoordinatorError::Order(OrderError::NoItems)));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_create_rejects_unknown_product() {
    let h = TestHarness::new();
    let request = CreateOrderRequest::new(BUYER, vec![OrderLineRequest::new(ProductId::new(99), 1)]);

    let err = h.coordinator.create(request).await.unwrap_err();

    assert!(matches!(err, CoordinatorError::ProductNotFound(id) if id == ProductId::new(99)));
    assert_eq!(h.repository.order_count().await, 0);
}

#[tokio::test]
async fn test_create_checks_every_line_before_deducting() {
    let h = TestHarness::new();
    let request = CreateOrderRequest::new(
        BUYER,
        vec![
            OrderLineRequest::new(WIDGET, 1),
            OrderLineRequest::new(GADGET, 6),
        ],
    );

    let err = h.coordinator.create(request).await.unwrap_err();

    assert!(matches!(
        err,
        CoordinatorError::InsufficientStock { product_id, requested: 6 } if product_id == GADGET
    ));
    assert!(h.products.deductions().is_empty());
    assert_eq!(h.products.stock_of(WIDGET), 10);
    assert_eq!(h.repository.order_count().await, 0);
}

#[tokio::test]
async fn test_create_deduction_failure_aborts_and_restores_deducted_lines() {
    let h = TestHarness::new();
    h.products.set_fail_on_deduct(Some(GADGET));

    let err = h.coordinator.create(TestHarness::basket()).await.unwrap_err();

    let CoordinatorError::StockDeductionFailed {
        product_id,
        order_no,
        ..
    } = err
    else {
        panic!("expected StockDeductionFailed");
    };
    assert_eq!(product_id, GADGET);

    // Widget was deducted and put back; gadget never left stock.
    assert_eq!(h.products.stock_of(WIDGET), 10);
    assert_eq!(h.products.stock_of(GADGET), 5);
    assert_eq!(h.products.deduct_count(&order_no), 1);
    assert_eq!(h.products.restore_count(&order_no), 1);

    let orders = h.coordinator.list_user_orders(BUYER).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status(), OrderStatus::Cancelled);
    assert!(!orders[0].stock_deducted());

    assert_eq!(h.sink.count_of(OrderEventType::StockDeductionFailed), 1);
    assert_eq!(h.sink.count_of(OrderEventType::OrderCreated), 0);
    assert_eq!(h.cart.clear_count(BUYER), 0);
}

#[tokio::test]
async fn test_create_marks_order_as_deducted() {
    let h = TestHarness::new();

    let order = h.create().await;

    assert!(order.stock_deducted());
    assert!(h.reload(order.id()).await.stock_deducted());
}

#[tokio::test]
async fn test_unrecorded_deduction_is_never_restored() {
    let h = TestHarness::new();
    h.repository.set_fail_on_save(true);

    let order = h.coordinator.create(TestHarness::basket()).await.unwrap();
    assert!(!h.reload(order.id()).await.stock_deducted());

    h.repository.set_fail_on_save(false);
    h.coordinator
        .cancel(order.id(), BUYER, "changed mind".to_string())
        .await
        .unwrap();

    assert_eq!(h.products.deduct_count(order.order_no()), 2);
    assert_eq!(h.products.restore_count(order.order_no()), 0);
    assert_eq!(h.products.stock_of(WIDGET), 8);
}

#[tokio::test]
async fn test_cart_failure_does_not_fail_create() {
    let h = TestHarness::new();
    h.cart.set_fail_on_clear(true);

    let order = h.coordinator.create(TestHarness::basket()).await.unwrap();

    assert_eq!(order.status(), OrderStatus::Pending);
    assert_eq!(h.sink.count_of(OrderEventType::OrderCreated), 1);
}

#[tokio::test]
async fn test_create_rejected_while_same_buyer_is_creating() {
    let h = TestHarness::new();
    h.lock_store
        .set_if_absent(
            &format!("order:create:{BUYER}"),
            "someone-else",
            Duration::from_secs(30),
        )
        .await
        .unwrap();

    let err = h.coordinator.create(TestHarness::basket()).await.unwrap_err();

    assert!(err.is_concurrency_rejection());
    assert_eq!(h.repository.order_count().await, 0);
}

// ---- pay ----

#[tokio::test]
async fn test_duplicate_payment_callback_is_a_no_op() {
    let h = TestHarness::new();
    let order = h.create().await;

    let first = h
        .coordinator
        .pay(order.order_no(), "PAY-1".to_string())
        .await
        .unwrap();
    let second = h
        .coordinator
        .pay(order.order_no(), "PAY-2".to_string())
        .await
        .unwrap();

    let PaymentOutcome::Applied(paid) = first else {
        panic!("first callback should apply");
    };
    assert_eq!(paid.status(), OrderStatus::Paid);
    assert_eq!(second, PaymentOutcome::AlreadyProcessed(OrderStatus::Paid));

    let stored = h.reload(order.id()).await;
    assert_eq!(stored.payment_id(), Some("PAY-1"));
    assert_eq!(stored.paid_amount(), Money::from_cents(4500));
    assert_eq!(h.sink.count_of(OrderEventType::OrderPaid), 1);
    assert_eq!(h.metrics.transition_count(TransitionKind::Pay), 1);
}

#[tokio::test]
async fn test_pay_unknown_order_number_is_not_found() {
    let h = TestHarness::new();

    let err = h
        .coordinator
        .pay(&common::OrderNo::new("ORD-missing"), "PAY-1".to_string())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_pay_after_cancel_reports_cancelled() {
    let h = TestHarness::new();
    let order = h.create().await;
    h.coordinator
        .cancel(order.id(), BUYER, "changed mind".to_string())
        .await
        .unwrap();

    let outcome = h
        .coordinator
        .pay(order.order_no(), "PAY-1".to_string())
        .await
        .unwrap();

    assert_eq!(outcome, PaymentOutcome::AlreadyProcessed(OrderStatus::Cancelled));
    assert_eq!(h.reload(order.id()).await.payment_id(), None);
    assert_eq!(h.sink.count_of(OrderEventType::OrderPaid), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_payment_callbacks_apply_once() {
    let h = TestHarness::new();
    let order = h.create().await;

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let coordinator = h.coordinator.clone();
            let order_no = order.order_no().clone();
            tokio::spawn(async move { coordinator.pay(&order_no, format!("PAY-{i}")).await })
        })
        .collect();

    let mut applied = 0;
    for task in tasks {
        match task.await.unwrap().unwrap() {
            PaymentOutcome::Applied(_) => applied += 1,
            PaymentOutcome::AlreadyProcessed(status) => assert_eq!(status, OrderStatus::Paid),
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(h.sink.count_of(OrderEventType::OrderPaid), 1);
    assert_eq!(h.metrics.transition_count(TransitionKind::Pay), 1);
    assert_eq!(h.reload(order.id()).await.paid_amount(), Money::from_cents(4500));
}

// ---- cancel ----

#[tokio::test]
async fn test_cancel_pending_restores_stock_once() {
    let h = TestHarness::new();
    let order = h.create().await;

    let cancelled = h
        .coordinator
        .cancel(order.id(), BUYER, "changed mind".to_string())
        .await
        .unwrap();

    assert_eq!(cancelled.status(), OrderStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason(), Some("changed mind"));
    assert_eq!(h.products.stock_of(WIDGET), 10);
    assert_eq!(h.products.stock_of(GADGET), 5);
    assert_eq!(h.payment.refund_count(), 0);

    let again = h
        .coordinator
        .cancel(order.id(), BUYER, "again".to_string())
        .await
        .unwrap_err();
    assert_eq!(again.kind(), ErrorKind::InvalidState);
    assert_eq!(h.products.restore_count(order.order_no()), 2);
    assert_eq!(h.sink.count_of(OrderEventType::OrderCancelled), 1);
}

#[tokio::test]
async fn test_cancel_paid_order_initiates_refund() {
    let h = TestHarness::new();
    let order = h.create_paid().await;

    h.coordinator
        .cancel(order.id(), BUYER, "too slow".to_string())
        .await
        .unwrap();

    let refunds = h.payment.refunds_for(order.order_no());
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].amount, Money::from_cents(4500));
    assert_eq!(refunds[0].reason, "too slow");
}

#[tokio::test]
async fn test_cancel_paid_order_survives_refund_failure() {
    let h = TestHarness::new();
    let order = h.create_paid().await;
    h.payment.set_fail_on_refund(true);

    let cancelled = h
        .coordinator
        .cancel(order.id(), BUYER, "too slow".to_string())
        .await
        .unwrap();

    assert_eq!(cancelled.status(), OrderStatus::Cancelled);
    assert_eq!(h.sink.count_of(OrderEventType::OrderCancelled), 1);
}

#[tokio::test]
async fn test_permission_and_state_failures_are_distinct() {
    let h = TestHarness::new();
    let order = h.create_shipped().await;

    let not_owner = h
        .coordinator
        .cancel(order.id(), OTHER_BUYER, "mine now".to_string())
        .await
        .unwrap_err();
    let wrong_state = h
        .coordinator
        .cancel(order.id(), BUYER, "too late".to_string())
        .await
        .unwrap_err();

    assert_eq!(not_owner.kind(), ErrorKind::Permission);
    assert_eq!(not_owner.kind().http_status(), 403);
    assert_eq!(wrong_state.kind(), ErrorKind::InvalidState);
    assert_eq!(wrong_state.kind().http_status(), 409);
    assert_eq!(h.reload(order.id()).await.status(), OrderStatus::Shipped);

    let failures = h.metrics.failures();
    assert!(failures.contains(&("cancel", ErrorKind::Permission)));
    assert!(failures.contains(&("cancel", ErrorKind::InvalidState)));
}

#[tokio::test]
async fn test_cancel_missing_order_is_not_found() {
    let h = TestHarness::new();

    let err = h
        .coordinator
        .cancel(OrderId::new(404), BUYER, "x".to_string())
        .await
        .unwrap_err();

    assert!(matches!(err, CoordinatorError::OrderNotFound(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cancels_transition_once() {
    let h = TestHarness::new();
    let order = h.create_paid().await;

    let tasks: Vec<_> = (0..2)
        .map(|i| {
            let coordinator = h.coordinator.clone();
            let order_id = order.id();
            tokio::spawn(async move {
                coordinator
                    .cancel(order_id, BUYER, format!("attempt {i}"))
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(h.sink.count_of(OrderEventType::OrderCancelled), 1);
    assert_eq!(h.products.restore_count(order.order_no()), 2);
    assert_eq!(h.payment.refund_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_buyer_and_admin_cancel_race_restores_once() {
    for _ in 0..20 {
        let h = TestHarness::new();
        let order = h.create_paid().await;

        let buyer = {
            let coordinator = h.coordinator.clone();
            let order_id = order.id();
            tokio::spawn(async move {
                coordinator
                    .cancel(order_id, BUYER, "buyer".to_string())
                    .await
            })
        };
        let admin = {
            let coordinator = h.coordinator.clone();
            let order_id = order.id();
            tokio::spawn(async move {
                coordinator
                    .update_status(order_id, OrderStatus::Cancelled)
                    .await
            })
        };
        let succeeded = [buyer.await.unwrap().is_ok(), admin.await.unwrap().is_ok()]
            .into_iter()
            .filter(|ok| *ok)
            .count();

        assert_eq!(succeeded, 1);
        assert_eq!(h.reload(order.id()).await.status(), OrderStatus::Cancelled);
        assert_eq!(h.sink.count_of(OrderEventType::OrderCancelled), 1);
        assert_eq!(
            h.products.restore_count(order.order_no()),
            h.products.deduct_count(order.order_no())
        );
        assert_eq!(h.payment.refund_count(), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_and_refund_request_race_settles_once() {
    for _ in 0..20 {
        let h = TestHarness::new();
        let order = h.create_paid().await;

        let cancel = {
            let coordinator = h.coordinator.clone();
            let order_id = order.id();
            tokio::spawn(async move {
                coordinator
                    .cancel(order_id, BUYER, "cancel".to_string())
                    .await
            })
        };
        let refund = {
            let coordinator = h.coordinator.clone();
            let order_id = order.id();
            tokio::spawn(async move {
                coordinator
                    .apply_refund(order_id, BUYER, "refund".to_string())
                    .await
            })
        };
        let cancelled = cancel.await.unwrap().is_ok();
        let refund_requested = refund.await.unwrap().is_ok();

        assert!(cancelled ^ refund_requested);
        assert_eq!(h.payment.refund_count(), 1);

        let stored = h.reload(order.id()).await;
        let restores = h.products.restore_count(order.order_no());
        if cancelled {
            assert_eq!(stored.status(), OrderStatus::Cancelled);
            assert_eq!(restores, h.products.deduct_count(order.order_no()));
        } else {
            assert_eq!(stored.status(), OrderStatus::RefundPending);
            assert_eq!(restores, 0);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_payment_and_cancel_race_keeps_stock_balanced() {
    for _ in 0..20 {
        let h = TestHarness::new();
        let order = h.create().await;

        let pay = {
            let coordinator = h.coordinator.clone();
            let order_no = order.order_no().clone();
            tokio::spawn(async move { coordinator.pay(&order_no, "PAY-1".to_string()).await })
        };
        let cancel = {
            let coordinator = h.coordinator.clone();
            let order_id = order.id();
            tokio::spawn(async move {
                coordinator
                    .cancel(order_id, BUYER, "cancel".to_string())
                    .await
            })
        };
        let _ = pay.await.unwrap();
        let _ = cancel.await.unwrap();

        let stored = h.reload(order.id()).await;
        let paid_events = h.sink.count_of(OrderEventType::OrderPaid);
        let restores = h.products.restore_count(order.order_no());
        assert!(paid_events <= 1);
        assert!(h.sink.count_of(OrderEventType::OrderCancelled) <= 1);

        match stored.status() {
            OrderStatus::Cancelled => {
                assert_eq!(restores, h.products.deduct_count(order.order_no()));
                // A refund is owed only if the payment landed first.
                assert_eq!(h.payment.refund_count(), paid_events);
            }
            OrderStatus::Paid => {
                assert_eq!(restores, 0);
                assert_eq!(paid_events, 1);
            }
            other => panic!("unexpected status {other}"),
        }
    }
}

#[tokio::test]
async fn test_cancel_rejected_while_lock_held() {
    let h = TestHarness::new();
    let order = h.create().await;
    h.lock_store
        .set_if_absent(
            &format!("order:cancel:{}", order.id()),
            "sweeper",
            Duration::from_secs(30),
        )
        .await
        .unwrap();

    let err = h
        .coordinator
        .cancel(order.id(), BUYER, "x".to_string())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConcurrencyRejected);
    assert_eq!(err.kind().http_status(), 429);
    assert_eq!(h.reload(order.id()).await.status(), OrderStatus::Pending);
}

#[tokio::test]
async fn test_failed_stock_restore_is_logged_for_replay() {
    let h = TestHarness::new();
    let order = h.create().await;
    h.products.set_fail_on_restore(true);

    let cancelled = h
        .coordinator
        .cancel(order.id(), BUYER, "x".to_string())
        .await
        .unwrap();

    assert_eq!(cancelled.status(), OrderStatus::Cancelled);
    assert_eq!(h.compensation.pending_count(), 2);
    assert_eq!(h.products.stock_of(WIDGET), 8);

    let report = h.coordinator.retry_compensations().await.unwrap();
    assert_eq!(report.succeeded, 0);
    assert_eq!(report.failed, 2);

    h.products.set_fail_on_restore(false);
    let report = h.coordinator.retry_compensations().await.unwrap();

    assert_eq!(report.succeeded, 2);
    assert_eq!(h.compensation.pending_count(), 0);
    assert_eq!(h.products.stock_of(WIDGET), 10);
    assert_eq!(h.products.stock_of(GADGET), 5);
    assert!(h.compensation.entries().iter().all(|e| e.attempts == 1));
}

// ---- events ----

#[tokio::test]
async fn test_event_publish_failure_does_not_fail_transition() {
    let h = TestHarness::new();
    let order = h.create().await;
    h.sink.set_fail_on_publish(true);

    let outcome = h
        .coordinator
        .pay(order.order_no(), "PAY-1".to_string())
        .await
        .unwrap();

    assert!(outcome.is_applied());
    assert_eq!(h.reload(order.id()).await.status(), OrderStatus::Paid);
    assert_eq!(h.sink.count_of(OrderEventType::OrderPaid), 0);
}

#[tokio::test]
async fn test_events_carry_old_and_new_status() {
    let h = TestHarness::new();
    let order = h.create_shipped().await;

    let shipped = h
        .sink
        .events_for(order.id())
        .into_iter()
        .find(|e| e.event_type == OrderEventType::OrderShipped)
        .unwrap();

    assert_eq!(shipped.routing_key(), "order.shipped");
    assert_eq!(shipped.old_status, Some(OrderStatus::Paid));
    assert_eq!(shipped.new_status, Some(OrderStatus::Shipped));
    assert_eq!(shipped.payload["trackingNo"], "TRK-1");
}

// ---- ship / confirm ----

#[tokio::test]
async fn test_ship_then_confirm() {
    let h = TestHarness::new();
    let order = h.create_shipped().await;
    assert_eq!(order.logistics_company(), Some("ACME"));

    let wrong_owner = h.coordinator.confirm(order.id(), OTHER_BUYER).await;
    assert_eq!(wrong_owner.unwrap_err().kind(), ErrorKind::Permission);

    let completed = h.coordinator.confirm(order.id(), BUYER).await.unwrap();
    assert_eq!(completed.status(), OrderStatus::Completed);
    assert!(completed.confirmed_at().is_some());

    let again = h.coordinator.confirm(order.id(), BUYER).await.unwrap_err();
    assert_eq!(again.kind(), ErrorKind::InvalidState);
    assert_eq!(h.sink.count_of(OrderEventType::OrderCompleted), 1);
}

#[tokio::test]
async fn test_ship_requires_payment() {
    let h = TestHarness::new();
    let order = h.create().await;

    let err = h
        .coordinator
        .ship(order.id(), "ACME".to_string(), "TRK".to_string())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CoordinatorError::Order(OrderError::InvalidState {
            current: OrderStatus::Pending,
            action: "ship"
        })
    ));
}

// ---- refunds ----

#[tokio::test]
async fn test_refund_failure_reverts_to_paid() {
    let h = TestHarness::new();
    let order = h.create_paid().await;
    h.payment.set_fail_on_refund(true);

    let err = h
        .coordinator
        .apply_refund(order.id(), BUYER, "broken".to_string())
        .await
        .unwrap_err();

    assert!(matches!(err, CoordinatorError::PaymentService(_)));
    let stored = h.reload(order.id()).await;
    assert_eq!(stored.status(), OrderStatus::Paid);
    assert_eq!(stored.refund_origin(), None);
    assert_eq!(h.sink.count_of(OrderEventType::RefundRequested), 0);

    h.payment.set_fail_on_refund(false);
    let retried = h
        .coordinator
        .apply_refund(order.id(), BUYER, "broken".to_string())
        .await
        .unwrap();

    assert_eq!(retried.status(), OrderStatus::RefundPending);
    assert_eq!(h.payment.refund_count(), 1);
    assert_eq!(h.sink.count_of(OrderEventType::RefundRequested), 1);
}

#[tokio::test]
async fn test_approved_refund_restores_stock_and_settles_amounts() {
    let h = TestHarness::new();
    let order = h.create_paid().await;
    h.coordinator
        .apply_refund(order.id(), BUYER, "broken".to_string())
        .await
        .unwrap();

    let refunded = h
        .coordinator
        .handle_refund(order.id(), true, None)
        .await
        .unwrap();

    assert_eq!(refunded.status(), OrderStatus::Refunded);
    assert_eq!(refunded.refund_amount(), Money::from_cents(4500));
    assert_eq!(refunded.payable_amount(), Money::zero());
    assert_eq!(h.products.stock_of(WIDGET), 10);
    assert_eq!(h.products.restore_count(order.order_no()), 2);
    assert_eq!(h.sink.count_of(OrderEventType::OrderRefunded), 1);

    let again = h.coordinator.handle_refund(order.id(), true, None).await;
    assert_eq!(again.unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(h.products.restore_count(order.order_no()), 2);
}

#[tokio::test]
async fn test_rejected_refund_returns_to_prior_status() {
    let h = TestHarness::new();
    let order = h.create_shipped().await;
    h.coordinator
        .apply_refund(order.id(), BUYER, "late".to_string())
        .await
        .unwrap();

    let rejected = h
        .coordinator
        .handle_refund(order.id(), false, Some("delivered fine".to_string()))
        .await
        .unwrap();

    assert_eq!(rejected.status(), OrderStatus::Shipped);
    assert_eq!(h.products.restore_count(order.order_no()), 0);
    assert_eq!(h.sink.count_of(OrderEventType::RefundRejected), 1);
}

#[tokio::test]
async fn test_refund_not_allowed_while_pending() {
    let h = TestHarness::new();
    let order = h.create().await;

    let err = h
        .coordinator
        .apply_refund(order.id(), BUYER, "x".to_string())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(h.payment.refund_count(), 0);
}

// ---- update_status ----

#[tokio::test]
async fn test_update_status_dispatches_through_transition_table() {
    let h = TestHarness::new();
    let order = h.create().await;

    let paid = h
        .coordinator
        .update_status(order.id(), OrderStatus::Paid)
        .await
        .unwrap();
    assert_eq!(
        paid.payment_id(),
        Some(format!("MANUAL-{}", order.order_no()).as_str())
    );

    let skip_ahead = h
        .coordinator
        .update_status(order.id(), OrderStatus::Completed)
        .await
        .unwrap_err();
    assert_eq!(skip_ahead.kind(), ErrorKind::InvalidState);

    let shipped = h
        .coordinator
        .update_status(order.id(), OrderStatus::Shipped)
        .await
        .unwrap();
    assert_eq!(shipped.tracking_no(), Some(order.order_no().as_str()));

    let back = h
        .coordinator
        .update_status(order.id(), OrderStatus::Pending)
        .await
        .unwrap_err();
    assert_eq!(back.kind(), ErrorKind::InvalidState);

    assert_eq!(h.sink.count_of(OrderEventType::OrderPaid), 1);
    assert_eq!(h.sink.count_of(OrderEventType::OrderShipped), 1);
}

#[tokio::test]
async fn test_update_status_cancel_restores_stock() {
    let h = TestHarness::new();
    let order = h.create().await;

    let cancelled = h
        .coordinator
        .update_status(order.id(), OrderStatus::Cancelled)
        .await
        .unwrap();

    assert_eq!(cancelled.cancel_reason(), Some("cancelled by administrator"));
    assert_eq!(h.products.stock_of(WIDGET), 10);
}

// ---- queries ----

#[tokio::test]
async fn test_get_order_checks_owner() {
    let h = TestHarness::new();
    let order = h.create().await;

    assert_eq!(h.coordinator.get_order(order.id(), BUYER).await.unwrap(), order);
    let err = h
        .coordinator
        .get_order(order.id(), OTHER_BUYER)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);

    let by_no = h.coordinator.get_order_by_no(order.order_no()).await.unwrap();
    assert_eq!(by_no.id(), order.id());
}

#[tokio::test]
async fn test_cached_reads_see_transitions() {
    let h = TestHarness::new();
    let order = h.create().await;

    let before = h.coordinator.list_user_orders(BUYER).await.unwrap();
    assert_eq!(before[0].status(), OrderStatus::Pending);
    h.coordinator.get_order(order.id(), BUYER).await.unwrap();

    h.coordinator
        .cancel(order.id(), BUYER, "x".to_string())
        .await
        .unwrap();

    let after = h.coordinator.list_user_orders(BUYER).await.unwrap();
    assert_eq!(after[0].status(), OrderStatus::Cancelled);
    let single = h.coordinator.get_order(order.id(), BUYER).await.unwrap();
    assert_eq!(single.status(), OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_logistics_visible_after_shipment() {
    let h = TestHarness::new();
    let pending = h.create().await;
    let err = h
        .coordinator
        .get_logistics(pending.id(), BUYER)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let shipped = h.create_shipped().await;
    let logistics = h.coordinator.get_logistics(shipped.id(), BUYER).await.unwrap();
    assert_eq!(logistics.carrier.as_deref(), Some("ACME"));
    assert_eq!(logistics.tracking_no.as_deref(), Some("TRK-1"));
    assert_eq!(logistics.tracks.len(), 1);
    assert_eq!(logistics.tracks[0].status, "shipped");

    h.coordinator.confirm(shipped.id(), BUYER).await.unwrap();
    let logistics = h.coordinator.get_logistics(shipped.id(), BUYER).await.unwrap();
    assert_eq!(logistics.tracks.len(), 2);
    assert_eq!(logistics.tracks[0].status, "delivered");
}

#[tokio::test]
async fn test_payment_window_queries() {
    let h = TestHarness::new();
    let t0 = Utc::now();
    let order = h.create_at(t0).await;

    let remaining = h
        .coordinator
        .remaining_payment_time_at(order.id(), t0 + chrono::Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!(remaining, Some(chrono::Duration::minutes(20)));
    assert!(
        !h.coordinator
            .is_payment_timed_out_at(order.id(), t0 + chrono::Duration::minutes(10))
            .await
            .unwrap()
    );

    let late = t0 + chrono::Duration::minutes(40);
    assert!(h.coordinator.is_payment_timed_out_at(order.id(), late).await.unwrap());
    assert_eq!(
        h.coordinator
            .remaining_payment_time_at(order.id(), late)
            .await
            .unwrap(),
        Some(chrono::Duration::zero())
    );

    h.coordinator
        .pay(order.order_no(), "PAY-1".to_string())
        .await
        .unwrap();
    assert_eq!(
        h.coordinator
            .remaining_payment_time_at(order.id(), late)
            .await
            .unwrap(),
        None
    );
}

// ---- reorder ----

#[tokio::test]
async fn test_reorder_copies_lines_at_current_prices() {
    let h = TestHarness::new();
    let original = h
        .coordinator
        .create(TestHarness::basket().with_shipping_fee(Money::from_cents(300)))
        .await
        .unwrap();
    h.products.set_price(GADGET, Money::from_cents(2000));

    let copy = h.coordinator.reorder(original.id(), BUYER).await.unwrap();

    assert_ne!(copy.id(), original.id());
    assert_ne!(copy.order_no(), original.order_no());
    assert_eq!(copy.items().len(), 2);
    assert_eq!(copy.items()[1].product_spec.as_deref(), Some("blue"));
    assert_eq!(copy.shipping_fee(), Money::from_cents(300));
    assert_eq!(copy.total_amount(), Money::from_cents(4300));
    assert_eq!(h.products.stock_of(WIDGET), 6);

    let err = h
        .coordinator
        .reorder(original.id(), OTHER_BUYER)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);
}
