//! Integration tests for the checkout pipeline.

use std::sync::Arc;
use std::time::Duration;

use bus::InMemoryEventBus;
use checkout::{
    CheckoutError, CheckoutService, DispatcherConfig, EventPublisher, InMemoryProductCatalog,
    OrderHistoryService, OutboxDispatcher, PublishError,
};
use common::{OrderId, ProductId, UserId};
use domain::{CheckoutItem, CheckoutRequest, OrderStatus};
use order_store::{IdempotencyGuard, InMemoryOrderStore, OrderStore, OrderStoreExt, OutboxStore};
use tokio_util::sync::CancellationToken;

type TestCheckout = CheckoutService<InMemoryOrderStore, InMemoryEventBus>;

struct TestHarness {
    service: TestCheckout,
    history: OrderHistoryService<InMemoryOrderStore>,
    store: Arc<InMemoryOrderStore>,
    bus: Arc<InMemoryEventBus>,
}

impl TestHarness {
    fn new() -> Self {
        let store = Arc::new(InMemoryOrderStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let service = CheckoutService::new(Arc::clone(&store), EventPublisher::new(Arc::clone(&bus)));
        let history = OrderHistoryService::new(Arc::clone(&store));

        Self {
            service,
            history,
            store,
            bus,
        }
    }

    fn with_catalog(mut self, catalog: InMemoryProductCatalog) -> Self {
        self.service = self.service.with_catalog(Arc::new(catalog));
        self
    }

    fn dispatcher(&self, grace_period: Duration) -> OutboxDispatcher<InMemoryOrderStore, InMemoryEventBus> {
        self.dispatcher_with(DispatcherConfig {
            poll_interval: Duration::from_millis(10),
            batch_size: 10,
            grace_period,
            max_attempts: 10,
        })
    }

    fn dispatcher_with(
        &self,
        config: DispatcherConfig,
    ) -> OutboxDispatcher<InMemoryOrderStore, InMemoryEventBus> {
        OutboxDispatcher::new(
            Arc::clone(&self.store),
            EventPublisher::new(Arc::clone(&self.bus)),
            config,
        )
    }
}

fn item(product_id: i64, quantity: i32, price: f64) -> CheckoutItem {
    CheckoutItem::new(ProductId::new(product_id), quantity, price)
}

fn reference_request() -> CheckoutRequest {
    CheckoutRequest::new(
        UserId::new(1),
        vec![item(10, 2, 5.0), item(11, 1, 3.0)],
        "card",
        "X",
    )
}

#[tokio::test]
async fn reference_checkout_persists_order_and_publishes_event() {
    let h = TestHarness::new();

    let order_id = h
        .service
        .checkout(reference_request().with_idempotency_token("T1"))
        .await
        .unwrap();

    let (order, detail) = h.store.load_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.user_id, UserId::new(1));
    assert_eq!(order.amount, 13.0);
    assert_eq!(order.total_qty, 3);
    assert_eq!(order.status, OrderStatus::Created);
    assert_eq!(order.payment_method, "card");

    let snapshot = detail.snapshot().unwrap();
    assert_eq!(snapshot.products, reference_request().items);
    assert_eq!(snapshot.history.len(), 1);
    assert_eq!(snapshot.history[0].status, OrderStatus::Created);

    assert!(h.store.check_token("T1").await.unwrap());

    let published = h.bus.published_to("order.created").await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].key, format!("order-{order_id}"));
    let payload: serde_json::Value = serde_json::from_slice(&published[0].payload).unwrap();
    assert_eq!(payload["order_id"], order_id.as_i64());
    assert_eq!(payload["user_id"], 1);
    assert_eq!(payload["total_amount"], 13.0);
    assert_eq!(payload["payment_method"], "card");
    assert_eq!(payload["shipping_address"], "X");

    assert!(h.store.outbox_messages().await[0].is_published());
}

#[tokio::test]
async fn reused_token_is_rejected_without_second_order() {
    let h = TestHarness::new();
    let request = reference_request().with_idempotency_token("T1");

    h.service.checkout(request.clone()).await.unwrap();
    let result = h.service.checkout(request).await;

    assert!(matches!(result, Err(CheckoutError::DuplicateRequest(_))));
    assert_eq!(h.store.order_count().await, 1);
    assert_eq!(h.bus.published().await.len(), 1);
}

#[tokio::test]
async fn concurrent_checkouts_with_one_token_create_one_order() {
    let h = TestHarness::new();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let service = h.service.clone();
        handles.push(tokio::spawn(async move {
            service
                .checkout(reference_request().with_idempotency_token("race"))
                .await
        }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(CheckoutError::DuplicateRequest(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(h.store.order_count().await, 1);
    assert_eq!(h.store.detail_count().await, 1);
    assert_eq!(h.bus.published().await.len(), 1);
}

#[tokio::test]
async fn tokens_differing_in_whitespace_are_distinct() {
    let h = TestHarness::new();

    h.service
        .checkout(reference_request().with_idempotency_token("abc"))
        .await
        .unwrap();
    h.service
        .checkout(reference_request().with_idempotency_token(" abc "))
        .await
        .unwrap();

    assert_eq!(h.store.order_count().await, 2);
    assert!(h.store.check_token("abc").await.unwrap());
    assert!(h.store.check_token(" abc ").await.unwrap());
}

#[tokio::test]
async fn overlong_payment_method_is_invalid_and_persists_nothing() {
    let h = TestHarness::new();
    let request = CheckoutRequest::new(
        UserId::new(1),
        vec![item(10, 1, 1.0)],
        "c".repeat(51),
        "X",
    )
    .with_idempotency_token("T1");

    let result = h.service.checkout(request).await;

    assert!(matches!(result, Err(CheckoutError::InvalidRequest(msg)) if msg.contains("payment method")));
    assert_eq!(h.store.order_count().await, 0);
    assert!(!h.store.check_token("T1").await.unwrap());
}

#[tokio::test]
async fn missing_or_blank_token_disables_dedup() {
    let h = TestHarness::new();

    let first = h.service.checkout(reference_request()).await.unwrap();
    let second = h.service.checkout(reference_request()).await.unwrap();
    let third = h
        .service
        .checkout(reference_request().with_idempotency_token(""))
        .await
        .unwrap();

    assert!(first < second && second < third);
    assert_eq!(h.store.order_count().await, 3);
    assert_eq!(h.store.token_count().await, 0);
}

#[tokio::test]
async fn invalid_requests_persist_nothing() {
    let h = TestHarness::new();
    let cases = vec![
        vec![],
        vec![item(10, 1, 1.0), item(10, 2, 1.0)],
        vec![item(10, 0, 1.0)],
        vec![item(10, 1001, 1.0)],
        vec![item(10, 1, 0.0)],
        vec![item(10, 1, f64::NAN)],
    ];

    for items in cases {
        let request = CheckoutRequest::new(UserId::new(1), items, "card", "X")
            .with_idempotency_token("never-recorded");
        let result = h.service.checkout(request).await;
        assert!(matches!(result, Err(CheckoutError::InvalidRequest(_))));
    }

    assert_eq!(h.store.order_count().await, 0);
    assert_eq!(h.store.token_count().await, 0);
    assert!(h.bus.published().await.is_empty());
}

#[tokio::test]
async fn duplicate_product_reported_before_other_violations() {
    let h = TestHarness::new();
    let request = CheckoutRequest::new(
        UserId::new(1),
        vec![item(10, 1, 1.0), item(10, 0, -1.0)],
        "card",
        "X",
    );

    match h.service.checkout(request).await {
        Err(CheckoutError::InvalidRequest(msg)) => assert!(msg.contains("duplicate"), "{msg}"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn failure_between_inserts_leaves_no_trace_and_token_is_reusable() {
    let h = TestHarness::new();
    h.store.set_fail_after_detail_insert(true);

    let result = h
        .service
        .checkout(reference_request().with_idempotency_token("T1"))
        .await;
    assert!(matches!(result, Err(CheckoutError::PersistenceFailure(_))));
    assert_eq!(h.store.order_count().await, 0);
    assert_eq!(h.store.detail_count().await, 0);
    assert!(!h.store.check_token("T1").await.unwrap());
    assert!(h.bus.published().await.is_empty());

    h.store.set_fail_after_detail_insert(false);
    h.service
        .checkout(reference_request().with_idempotency_token("T1"))
        .await
        .unwrap();
    assert_eq!(h.store.order_count().await, 1);
}

#[tokio::test]
async fn publish_failure_reports_order_and_dispatcher_delivers_later() {
    let h = TestHarness::new();
    h.bus.set_fail_on_publish(true).await;

    let order_id = match h.service.checkout(reference_request()).await {
        Err(CheckoutError::EventPublishFailed {
            order_id,
            source: PublishError::Transport(_),
        }) => order_id,
        other => panic!("unexpected result: {other:?}"),
    };

    // The order is committed; the failed publish is not hidden.
    assert!(h.store.get_order(order_id).await.unwrap().is_some());
    let pending = h.store.outbox_messages().await;
    assert_eq!(pending.len(), 1);
    assert!(!pending[0].is_published());
    assert_eq!(pending[0].attempts, 1);

    let dispatcher = h.dispatcher(Duration::ZERO);
    assert_eq!(dispatcher.dispatch_once().await.unwrap(), 0);
    assert_eq!(h.store.outbox_messages().await[0].attempts, 2);

    h.bus.set_fail_on_publish(false).await;
    assert_eq!(dispatcher.dispatch_once().await.unwrap(), 1);

    let published = h.bus.published_to("order.created").await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].key, format!("order-{order_id}"));
    assert!(h.store.outbox_messages().await[0].is_published());

    assert_eq!(dispatcher.dispatch_once().await.unwrap(), 0);
}

#[tokio::test]
async fn dispatcher_leaves_fresh_rows_to_checkout() {
    let h = TestHarness::new();
    h.bus.set_fail_on_publish(true).await;
    let _ = h.service.checkout(reference_request()).await;
    h.bus.set_fail_on_publish(false).await;

    let dispatcher = h.dispatcher(Duration::from_secs(3600));
    assert_eq!(dispatcher.dispatch_once().await.unwrap(), 0);
    assert!(h.bus.published().await.is_empty());
}

#[tokio::test]
async fn dispatcher_run_stops_on_cancel() {
    let h = TestHarness::new();
    h.bus.set_fail_on_publish(true).await;
    let _ = h.service.checkout(reference_request()).await;
    h.bus.set_fail_on_publish(false).await;

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(h.dispatcher(Duration::ZERO).run(shutdown.clone()));

    tokio::time::timeout(Duration::from_secs(2), async {
        while h.bus.published().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn dispatcher_stops_retrying_row_out_of_attempts() {
    let h = TestHarness::new();
    h.bus.set_fail_on_publish(true).await;
    let _ = h.service.checkout(reference_request()).await;

    let dispatcher = h.dispatcher_with(DispatcherConfig {
        grace_period: Duration::ZERO,
        max_attempts: 3,
        ..DispatcherConfig::default()
    });
    // The checkout's own publish counted as the first attempt.
    dispatcher.dispatch_once().await.unwrap();
    dispatcher.dispatch_once().await.unwrap();
    assert_eq!(h.store.outbox_messages().await[0].attempts, 3);

    h.bus.set_fail_on_publish(false).await;
    assert_eq!(dispatcher.dispatch_once().await.unwrap(), 0);
    assert!(h.bus.published().await.is_empty());
    let rows = h.store.outbox_messages().await;
    assert_eq!(rows[0].attempts, 3);
    assert!(!rows[0].is_published());
}

#[tokio::test]
async fn dispatcher_run_with_zero_poll_interval_keeps_running() {
    let h = TestHarness::new();
    h.bus.set_fail_on_publish(true).await;
    let _ = h.service.checkout(reference_request()).await;
    h.bus.set_fail_on_publish(false).await;

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(
        h.dispatcher_with(DispatcherConfig {
            poll_interval: Duration::ZERO,
            grace_period: Duration::ZERO,
            ..DispatcherConfig::default()
        })
        .run(shutdown.clone()),
    );

    tokio::time::timeout(Duration::from_secs(2), async {
        while h.bus.published().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert!(!task.is_finished());
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn unknown_product_is_invalid_and_persists_nothing() {
    let h = TestHarness::new().with_catalog(InMemoryProductCatalog::with_products([10]));

    let result = h.service.checkout(reference_request()).await;

    assert!(matches!(result, Err(CheckoutError::InvalidRequest(msg)) if msg.contains("11")));
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test]
async fn catalog_outage_is_upstream_unavailable() {
    let catalog = InMemoryProductCatalog::with_products([10, 11]);
    catalog.set_unavailable(true);
    let h = TestHarness::new().with_catalog(catalog);

    let result = h.service.checkout(reference_request()).await;

    assert!(matches!(result, Err(CheckoutError::UpstreamUnavailable(_))));
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test]
async fn known_products_pass_catalog_check() {
    let h = TestHarness::new().with_catalog(InMemoryProductCatalog::with_products([10, 11]));
    assert!(h.service.checkout(reference_request()).await.is_ok());
}

#[tokio::test]
async fn history_lists_newest_first_with_filter() {
    let h = TestHarness::new();
    let first = h.service.checkout(reference_request()).await.unwrap();
    let second = h.service.checkout(reference_request()).await.unwrap();
    h.service
        .checkout(CheckoutRequest::new(
            UserId::new(2),
            vec![item(12, 1, 1.0)],
            "cash",
            "Y",
        ))
        .await
        .unwrap();
    h.store
        .update_status(first, OrderStatus::Completed)
        .await
        .unwrap();

    let all = h.history.list(UserId::new(1), None).await.unwrap();
    assert_eq!(
        all.iter().map(|r| r.order_id).collect::<Vec<OrderId>>(),
        vec![second, first]
    );
    assert_eq!(all[1].status, OrderStatus::Completed);
    assert_eq!(all[1].history.len(), 2);
    assert_eq!(all[0].total_amount, 13.0);
    assert_eq!(all[0].products.len(), 2);

    let completed = h
        .history
        .list(UserId::new(1), Some(OrderStatus::Completed))
        .await
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].order_id, first);

    assert!(h.history.list(UserId::new(9), None).await.unwrap().is_empty());
}

#[tokio::test]
async fn history_surfaces_corrupt_detail() {
    let h = TestHarness::new();
    let order_id = h.service.checkout(reference_request()).await.unwrap();
    let order = h.store.get_order(order_id).await.unwrap().unwrap();
    h.store
        .overwrite_products(order.order_detail_id, "[{\"product_id\":")
        .await;

    let result = h.history.list(UserId::new(1), None).await;
    assert!(matches!(result, Err(CheckoutError::CorruptData(_))));
}
