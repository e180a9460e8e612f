//! Shared fixture for coordinator integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use coordinator::{
    CoordinatorConfig, CreateOrderRequest, EventPublisher, InMemoryCartService,
    InMemoryCompensationLog, InMemoryEventSink, InMemoryPaymentService, InMemoryProductService,
    OrderLifecycleCoordinator, OrderLineRequest, ProductSnapshot, RecordingMetricsRecorder,
    TimeoutSweeper,
};
use domain::{Money, Order};
use lock::{InMemoryCoordinationStore, LockConfig, LockCoordinator};
use order_store::{InMemoryOrderRepository, OrderRepositoryExt};

pub type TestCoordinator = OrderLifecycleCoordinator<
    InMemoryOrderRepository,
    InMemoryProductService,
    InMemoryCartService,
    InMemoryPaymentService,
>;

pub const BUYER: UserId = UserId::new(100);
pub const OTHER_BUYER: UserId = UserId::new(200);
pub const WIDGET: ProductId = ProductId::new(1);
pub const GADGET: ProductId = ProductId::new(2);

pub struct TestHarness {
    pub coordinator: Arc<TestCoordinator>,
    pub repository: InMemoryOrderRepository,
    pub products: InMemoryProductService,
    pub cart: InMemoryCartService,
    pub payment: InMemoryPaymentService,
    pub sink: InMemoryEventSink,
    pub metrics: RecordingMetricsRecorder,
    pub compensation: InMemoryCompensationLog,
    pub lock_store: InMemoryCoordinationStore,
}

impl TestHarness {
    pub fn new() -> Self {
        let repository = InMemoryOrderRepository::new();
        let products = InMemoryProductService::new();
        let cart = InMemoryCartService::new();
        let payment = InMemoryPaymentService::new();
        let sink = InMemoryEventSink::new();
        let metrics = RecordingMetricsRecorder::new();
        let compensation = InMemoryCompensationLog::new();
        let lock_store = InMemoryCoordinationStore::new();

        products.add_product(
            ProductSnapshot::new(WIDGET, "Widget", Money::from_cents(1000)),
            10,
        );
        products.add_product(
            ProductSnapshot::new(GADGET, "Gadget", Money::from_cents(2500)).with_image("gadget.png"),
            5,
        );

        let locks = LockCoordinator::new(
            Arc::new(lock_store.clone()),
            LockConfig::default()
                .with_wait(Duration::from_millis(200))
                .with_poll_interval(Duration::from_millis(10)),
        );
        let publisher = EventPublisher::new(Arc::new(sink.clone()), Duration::from_millis(500));

        let coordinator = OrderLifecycleCoordinator::new(
            repository.clone(),
            products.clone(),
            cart.clone(),
            payment.clone(),
            locks,
            publisher,
            CoordinatorConfig::default(),
        )
        .with_metrics(Arc::new(metrics.clone()))
        .with_compensation_log(Arc::new(compensation.clone()));

        Self {
            coordinator: Arc::new(coordinator),
            repository,
            products,
            cart,
            payment,
            sink,
            metrics,
            compensation,
            lock_store,
        }
    }

    pub fn sweeper(&self) -> TimeoutSweeper<
        InMemoryOrderRepository,
        InMemoryProductService,
        InMemoryCartService,
        InMemoryPaymentService,
    > {
        TimeoutSweeper::new(self.coordinator.clone())
    }

    /// Two widgets and one gadget: 45.00 before shipping.
    pub fn basket() -> CreateOrderRequest {
        CreateOrderRequest::new(
            BUYER,
            vec![
                OrderLineRequest::new(WIDGET, 2),
                OrderLineRequest::new(GADGET, 1).with_spec("blue"),
            ],
        )
    }

    pub async fn create(&self) -> Order {
        self.coordinator.create(Self::basket()).await.unwrap()
    }

    pub async fn create_at(&self, now: DateTime<Utc>) -> Order {
        self.coordinator
            .create_at(Self::basket(), now)
            .await
            .unwrap()
    }

    pub async fn create_paid(&self) -> Order {
        let order = self.create().await;
        self.coordinator
            .pay(order.order_no(), "PAY-1".to_string())
            .await
            .unwrap();
        self.reload(order.id()).await
    }

    pub async fn create_shipped(&self) -> Order {
        let order = self.create_paid().await;
        self.coordinator
            .ship(order.id(), "ACME".to_string(), "TRK-1".to_string())
            .await
            .unwrap()
    }

    pub async fn reload(&self, order_id: OrderId) -> Order {
        self.repository.load(order_id).await.unwrap()
    }
}
