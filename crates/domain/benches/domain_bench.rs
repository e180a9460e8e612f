use chrono::Utc;
use common::{OrderId, OrderNo, ProductId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    Money, NewOrder, Order, OrderItem, OrderStatus, OrderTransition, Recipient, TransitionKind,
};
use std::hint::black_box;

fn new_order(item_count: i64) -> NewOrder {
    let items = (1..=item_count)
        .map(|i| {
            OrderItem::new(
                ProductId::new(i),
                format!("Product {i}"),
                Money::from_cents(100 * i),
                1,
            )
        })
        .collect();

    NewOrder {
        id: OrderId::new(1),
        order_no: OrderNo::generate("ORD", Utc::now()),
        user_id: UserId::new(1),
        items,
        shipping_fee: Money::from_cents(500),
        discount_amount: Money::zero(),
        recipient: Recipient::default(),
        remark: None,
        created_at: Utc::now(),
    }
}

fn bench_transition_table(c: &mut Criterion) {
    c.bench_function("domain/transition_table_full_grid", |b| {
        b.iter(|| {
            for kind in TransitionKind::ALL {
                for from in OrderStatus::ALL {
                    black_box(kind.target(from, Some(OrderStatus::Shipped)));
                }
            }
        });
    });
}

fn bench_place_order(c: &mut Criterion) {
    c.bench_function("domain/place_order_50_items", |b| {
        b.iter(|| Order::place(black_box(new_order(50))).unwrap());
    });
}

fn bench_happy_path(c: &mut Criterion) {
    c.bench_function("domain/pay_ship_confirm", |b| {
        b.iter(|| {
            let mut order = Order::place(new_order(3)).unwrap();
            let now = Utc::now();
            order
                .apply_transition(
                    OrderTransition::Pay {
                        payment_id: "PAY-BENCH".to_string(),
                    },
                    now,
                )
                .unwrap();
            order
                .apply_transition(
                    OrderTransition::Ship {
                        carrier: "SF".to_string(),
                        tracking_no: "SF0001".to_string(),
                    },
                    now,
                )
                .unwrap();
            order
                .apply_transition(OrderTransition::Confirm, now)
                .unwrap();
            black_box(order)
        });
    });
}

criterion_group!(
    benches,
    bench_transition_table,
    bench_place_order,
    bench_happy_path,
);
criterion_main!(benches);
