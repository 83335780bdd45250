mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{body_json, create_test_app, FakeGateway, TestDb, WEBHOOK_AUTH};
use telepsi_billing::ledger::{self, DeliveryOutcome};
use telepsi_billing::types::PurchaseStatus;
use tower::ServiceExt; // for `oneshot`

fn webhook_request(auth: Option<&str>, body: &serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/webhook/pagarme")
        .header("content-type", "application/json");
    if let Some(auth) = auth {
        builder = builder.header("authorization", auth);
    }
    builder
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn event(event_type: &str, order_id: &str) -> serde_json::Value {
    serde_json::json!({
        "id": format!("hook_{}", uuid::Uuid::new_v4().simple()),
        "type": event_type,
        "data": {
            "id": order_id,
            "charges": [{ "id": "ch_1", "last_transaction": { "id": "tran_1" } }]
        }
    })
}

#[tokio::test]
async fn test_order_paid_delivers_credits_once() {
    let db = TestDb::new();
    db.insert_user("u1", 5);
    db.insert_purchase("u1", "ord_123", PurchaseStatus::Pending, Some(10));
    let app = create_test_app(&db, Arc::new(FakeGateway::default()));

    let res = app
        .clone()
        .oneshot(webhook_request(Some(WEBHOOK_AUTH), &event("order.paid", "ord_123")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await, serde_json::json!({ "received": true }));

    assert_eq!(db.balance("u1"), 15);
    let purchase = db.purchase("ord_123").unwrap();
    assert_eq!(purchase.status, PurchaseStatus::Delivered);
    assert_eq!(purchase.qtd_creditos, None);

    // Gateway redelivery of the same event
    for _ in 0..3 {
        let res = app
            .clone()
            .oneshot(webhook_request(Some(WEBHOOK_AUTH), &event("order.paid", "ord_123")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    assert_eq!(db.balance("u1"), 15);
    assert_eq!(
        db.purchase("ord_123").unwrap().status,
        PurchaseStatus::Delivered
    );
}

#[tokio::test]
async fn test_status_events_map_to_purchase_status() {
    let cases = [
        ("order.payment_failed", PurchaseStatus::Failed),
        ("order.payment_processing", PurchaseStatus::Processing),
        ("order.payment.canceled", PurchaseStatus::Failed),
        ("order.payment.pending", PurchaseStatus::Pending),
    ];

    let db = TestDb::new();
    db.insert_user("u1", 0);
    let app = create_test_app(&db, Arc::new(FakeGateway::default()));

    for (i, (event_type, expected)) in cases.into_iter().enumerate() {
        let order_id = format!("ord_{}", i);
        db.insert_purchase("u1", &order_id, PurchaseStatus::WaitingPayment, Some(10));

        let res = app
            .clone()
            .oneshot(webhook_request(Some(WEBHOOK_AUTH), &event(event_type, &order_id)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let purchase = db.purchase(&order_id).unwrap();
        assert_eq!(purchase.status, expected, "event {}", event_type);
        assert_eq!(purchase.qtd_creditos, Some(10));
    }

    // None of the non-paid events may credit anything
    assert_eq!(db.balance("u1"), 0);
}

#[tokio::test]
async fn test_bad_or_missing_auth_is_rejected_without_mutation() {
    let db = TestDb::new();
    db.insert_user("u1", 5);
    db.insert_purchase("u1", "ord_123", PurchaseStatus::Pending, Some(10));
    let app = create_test_app(&db, Arc::new(FakeGateway::default()));

    for auth in [None, Some("Basic d3Jvbmc6Y3JlZHM="), Some("Bearer aG9vazpwYXNz")] {
        let res = app
            .clone()
            .oneshot(webhook_request(auth, &event("order.paid", "ord_123")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(res).await,
            serde_json::json!({ "error": "Unauthorized" })
        );
    }

    assert_eq!(db.balance("u1"), 5);
    let purchase = db.purchase("ord_123").unwrap();
    assert_eq!(purchase.status, PurchaseStatus::Pending);
    assert_eq!(purchase.qtd_creditos, Some(10));
}

#[tokio::test]
async fn test_malformed_body_returns_400() {
    let db = TestDb::new();
    let app = create_test_app(&db, Arc::new(FakeGateway::default()));

    let req = Request::builder()
        .method("POST")
        .uri("/api/webhook/pagarme")
        .header("authorization", WEBHOOK_AUTH)
        .header("content-type", "application/json")
        .body(Body::from("{\"type\": \"order.paid\""))
        .unwrap();
    let res = app.oneshot(req).await.unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(res).await,
        serde_json::json!({ "error": "Webhook error" })
    );
}

#[tokio::test]
async fn test_unknown_order_and_unknown_event_still_acknowledged() {
    let db = TestDb::new();
    db.insert_user("u1", 5);
    db.insert_purchase("u1", "ord_123", PurchaseStatus::Pending, Some(10));
    let app = create_test_app(&db, Arc::new(FakeGateway::default()));

    let res = app
        .clone()
        .oneshot(webhook_request(Some(WEBHOOK_AUTH), &event("order.paid", "ord_missing")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .oneshot(webhook_request(Some(WEBHOOK_AUTH), &event("order.created", "ord_123")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    assert_eq!(db.balance("u1"), 5);
    assert_eq!(
        db.purchase("ord_123").unwrap().status,
        PurchaseStatus::Pending
    );
}

#[tokio::test]
async fn test_purchase_found_by_last_transaction_id() {
    let db = TestDb::new();
    db.insert_user("u1", 0);
    db.insert_purchase("u1", "tran_1", PurchaseStatus::WaitingPayment, Some(4));
    let app = create_test_app(&db, Arc::new(FakeGateway::default()));

    let res = app
        .oneshot(webhook_request(Some(WEBHOOK_AUTH), &event("order.paid", "or_other")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    assert_eq!(db.balance("u1"), 4);
    assert_eq!(
        db.purchase("tran_1").unwrap().status,
        PurchaseStatus::Delivered
    );
}

#[tokio::test]
async fn test_late_status_event_does_not_reopen_delivered_purchase() {
    let db = TestDb::new();
    db.insert_user("u1", 0);
    db.insert_purchase("u1", "ord_9", PurchaseStatus::Pending, Some(7));
    let app = create_test_app(&db, Arc::new(FakeGateway::default()));

    for event_type in ["order.paid", "order.payment.pending", "order.paid"] {
        let res = app
            .clone()
            .oneshot(webhook_request(Some(WEBHOOK_AUTH), &event(event_type, "ord_9")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    assert_eq!(db.balance("u1"), 7);
    assert_eq!(db.purchase("ord_9").unwrap().status, PurchaseStatus::Delivered);
}

#[tokio::test]
async fn test_liveness_check() {
    let db = TestDb::new();
    let app = create_test_app(&db, Arc::new(FakeGateway::default()));

    let req = Request::builder()
        .method("GET")
        .uri("/api/webhook/pagarme")
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        body_json(res).await,
        serde_json::json!({ "message": "Webhook ativo e funcionando!" })
    );
}

#[test]
fn test_delivery_requires_paid_status() {
    let db = TestDb::new();
    db.insert_user("u1", 1);

    for (i, status) in [
        PurchaseStatus::Pending,
        PurchaseStatus::WaitingPayment,
        PurchaseStatus::Processing,
        PurchaseStatus::Failed,
    ]
    .into_iter()
    .enumerate()
    {
        let payment_id = format!("ord_{}", i);
        db.insert_purchase("u1", &payment_id, status, Some(10));

        let outcome = ledger::deliver_credits(&mut db.conn(), &payment_id).unwrap();
        assert_eq!(outcome, DeliveryOutcome::NotPaid(status));
    }

    assert_eq!(
        ledger::deliver_credits(&mut db.conn(), "ord_unknown").unwrap(),
        DeliveryOutcome::NotFound
    );
    assert_eq!(db.balance("u1"), 1);
}

#[test]
fn test_paid_purchase_without_credits_is_not_delivered() {
    let db = TestDb::new();
    db.insert_user("u1", 1);
    db.insert_purchase("u1", "ord_1", PurchaseStatus::Paid, None);

    assert_eq!(
        ledger::deliver_credits(&mut db.conn(), "ord_1").unwrap(),
        DeliveryOutcome::AlreadyDelivered
    );
    assert_eq!(db.balance("u1"), 1);
}

#[test]
fn test_concurrent_deliveries_credit_once() {
    let db = TestDb::new();
    db.insert_user("u1", 5);
    db.insert_purchase("u1", "ord_race", PurchaseStatus::Paid, Some(10));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = db.pool.clone();
            std::thread::spawn(move || {
                let mut conn = pool.get().unwrap();
                ledger::deliver_credits(&mut conn, "ord_race").unwrap()
            })
        })
        .collect();

    let outcomes: Vec<DeliveryOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let delivered = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, DeliveryOutcome::Delivered { .. }))
        .count();

    assert_eq!(delivered, 1);
    assert!(outcomes.iter().all(|outcome| matches!(
        outcome,
        DeliveryOutcome::Delivered { .. } | DeliveryOutcome::AlreadyDelivered
    )));
    assert_eq!(db.balance("u1"), 15);
}
