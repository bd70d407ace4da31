//! Integration tests for the HTTP API over in-memory collaborators.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use bus::InMemoryEventBus;
use checkout::{InMemoryProductCatalog, ProductCatalog};
use common::OrderId;
use domain::{ORDER_CREATED_TOPIC, OrderStatus};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{InMemoryOrderStore, OrderStore};
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    store: Arc<InMemoryOrderStore>,
    bus: Arc<InMemoryEventBus>,
}

fn setup() -> TestApp {
    setup_with_catalog(None)
}

fn setup_with_catalog(catalog: Option<Arc<dyn ProductCatalog>>) -> TestApp {
    let store = Arc::new(InMemoryOrderStore::new());
    let bus = Arc::new(InMemoryEventBus::new());
    let state = api::create_state(Arc::clone(&store), Arc::clone(&bus), catalog);
    let app = api::create_app(state, get_metrics_handle());
    TestApp { app, store, bus }
}

fn checkout_body(token: Option<&str>) -> Value {
    let mut body = json!({
        "items": [
            {"product_id": 10, "quantity": 2, "price": 5.0},
            {"product_id": 11, "quantity": 1, "price": 3.0}
        ],
        "payment_method": "card",
        "shipping_address": "1 Main St"
    });
    if let Some(token) = token {
        body["idempotency_token"] = json!(token);
    }
    body
}

fn post_order(user_id: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/orders")
        .header("content-type", "application/json");
    if let Some(user_id) = user_id {
        builder = builder.header(api::USER_ID_HEADER, user_id);
    }
    builder
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

fn get_history(user_id: &str, query: &str) -> Request<Body> {
    Request::builder()
        .uri(format!("/api/v1/orders/history{query}"))
        .header(api::USER_ID_HEADER, user_id)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_ping_and_health() {
    let TestApp { app, .. } = setup();

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"message": "pong"}));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "orderfc");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let TestApp { app, .. } = setup();

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_checkout_creates_order() {
    let TestApp { app, store, bus } = setup();

    let response = app
        .oneshot(post_order(Some("7"), &checkout_body(Some("tok-1"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = json_body(response).await;
    assert_eq!(json["message"], "Order created successfully");
    let order_id = OrderId::new(json["order_id"].as_i64().unwrap());

    let order = store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.user_id.as_i64(), 7);
    assert_eq!(order.amount, 13.0);
    assert_eq!(order.total_qty, 3);

    let events = bus.published_to(ORDER_CREATED_TOPIC).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].key, order_id.partition_key());
}

#[tokio::test]
async fn test_checkout_requires_caller_identity() {
    let TestApp { app, store, .. } = setup();

    for user_id in [None, Some("abc"), Some("0")] {
        let response = app
            .clone()
            .oneshot(post_order(user_id, &checkout_body(None)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{user_id:?}");
        assert!(json_body(response).await["error"].is_string());
    }
    assert_eq!(store.order_count().await, 0);
}

#[tokio::test]
async fn test_reused_token_is_conflict() {
    let TestApp { app, store, bus } = setup();

    let first = app
        .clone()
        .oneshot(post_order(Some("7"), &checkout_body(Some("tok-dup"))))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app
        .oneshot(post_order(Some("7"), &checkout_body(Some("tok-dup"))))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert!(
        json_body(second).await["error"]
            .as_str()
            .unwrap()
            .contains("tok-dup")
    );

    assert_eq!(store.order_count().await, 1);
    assert_eq!(bus.published_to(ORDER_CREATED_TOPIC).await.len(), 1);
}

#[tokio::test]
async fn test_invalid_items_are_bad_request() {
    let TestApp { app, store, .. } = setup();

    let bodies = [
        json!({"items": [], "payment_method": "card", "shipping_address": "X"}),
        json!({"items": [{"product_id": 10, "quantity": 0, "price": 1.0}]}),
        json!({"items": [{"product_id": 10, "quantity": 1, "price": -1.0}]}),
        json!({"items": [
            {"product_id": 10, "quantity": 1, "price": 1.0},
            {"product_id": 10, "quantity": 2, "price": 1.0}
        ]}),
    ];

    for body in &bodies {
        let response = app.clone().oneshot(post_order(Some("7"), body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
    }
    assert_eq!(store.order_count().await, 0);
}

#[tokio::test]
async fn test_overlong_payment_method_is_bad_request() {
    let TestApp { app, store, .. } = setup();
    let mut body = checkout_body(Some("T-long"));
    body["payment_method"] = json!("x".repeat(51));

    let response = app.oneshot(post_order(Some("7"), &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = json_body(response).await["error"].as_str().unwrap().to_string();
    assert!(error.contains("payment method"), "{error}");
    assert_eq!(store.order_count().await, 0);
    assert_eq!(store.token_count().await, 0);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let TestApp { app, .. } = setup();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/orders")
                .header("content-type", "application/json")
                .header(api::USER_ID_HEADER, "7")
                .body(Body::from("{\"items\": [{\"product_id\": \"ten\"}]}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["error"].is_string());
}

#[tokio::test]
async fn test_publish_failure_reports_order_id() {
    let TestApp { app, store, bus } = setup();
    bus.set_fail_on_publish(true).await;

    let response = app
        .oneshot(post_order(Some("7"), &checkout_body(None)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    let order_id = OrderId::new(json["order_id"].as_i64().unwrap());
    assert!(store.get_order(order_id).await.unwrap().is_some());

    let outbox = store.outbox_messages().await;
    assert_eq!(outbox.len(), 1);
    assert!(!outbox[0].is_published());
}

#[tokio::test]
async fn test_persistence_failure_is_internal_error() {
    let TestApp { app, store, .. } = setup();
    store.set_fail_after_detail_insert(true);

    let response = app
        .oneshot(post_order(Some("7"), &checkout_body(Some("tok-rb"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(store.order_count().await, 0);
    assert_eq!(store.token_count().await, 0);
}

#[tokio::test]
async fn test_unknown_product_and_catalog_outage() {
    let catalog = Arc::new(InMemoryProductCatalog::with_products([10]));
    let TestApp { app, store, .. } =
        setup_with_catalog(Some(Arc::clone(&catalog) as Arc<dyn ProductCatalog>));

    let response = app
        .clone()
        .oneshot(post_order(Some("7"), &checkout_body(None)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(
        json_body(response).await["error"]
            .as_str()
            .unwrap()
            .contains("product 11")
    );

    catalog.set_unavailable(true);
    let response = app
        .oneshot(post_order(Some("7"), &checkout_body(None)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    assert_eq!(store.order_count().await, 0);
}

#[tokio::test]
async fn test_history_lists_callers_orders_newest_first() {
    let TestApp { app, .. } = setup();

    for user_id in ["7", "7", "8"] {
        let response = app
            .clone()
            .oneshot(post_order(Some(user_id), &checkout_body(None)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app.oneshot(get_history("7", "")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let orders = json_body(response).await;
    let orders = orders.as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert!(orders[0]["order_id"].as_i64() > orders[1]["order_id"].as_i64());

    let first = &orders[0];
    assert_eq!(first["status"], "created");
    assert_eq!(first["total_amount"], 13.0);
    assert_eq!(first["total_qty"], 3);
    assert_eq!(first["products"].as_array().unwrap().len(), 2);
    assert_eq!(first["history"][0]["status"], "created");
}

#[tokio::test]
async fn test_history_filters_by_status_label_or_code() {
    let TestApp { app, store, .. } = setup();

    let mut ids = Vec::new();
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post_order(Some("7"), &checkout_body(None)))
            .await
            .unwrap();
        ids.push(OrderId::new(json_body(response).await["order_id"].as_i64().unwrap()));
    }
    store
        .update_status(ids[0], OrderStatus::Completed)
        .await
        .unwrap();

    for query in ["?status=completed", "?status=2"] {
        let response = app.clone().oneshot(get_history("7", query)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let orders = json_body(response).await;
        let orders = orders.as_array().unwrap();
        assert_eq!(orders.len(), 1, "{query}");
        assert_eq!(orders[0]["order_id"], ids[0].as_i64());
        assert_eq!(orders[0]["history"].as_array().unwrap().len(), 2);
    }

    let response = app.oneshot(get_history("7", "?status=shipped")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_history_for_user_without_orders_is_empty() {
    let TestApp { app, .. } = setup();

    let response = app.oneshot(get_history("99", "")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!([]));
}
