//! Integration tests for the two reconciliation paths: webhook-driven
//! completion, client-side recording, their race, and the idempotency
//! guarantees around the pending-purchase staging row.

mod common;

use common::{response_json, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;
use uuid::Uuid;

use livraria_api::entities::{purchase_history, PendingPurchase, PurchaseHistory};

async fn checkout(app: &TestApp, token: Option<&str>) -> String {
    let response = app
        .post_json(
            "/api/v1/checkout/session",
            json!({"items": [{"name": "Livro A", "price": 29.90, "quantity": 2}]}),
            token,
            None,
        )
        .await;
    assert_eq!(response.status(), 200);
    response_json(response).await["referenceId"]
        .as_str()
        .unwrap()
        .to_string()
}

fn paid_webhook(reference: &str) -> serde_json::Value {
    json!({
        "id": "evt_1",
        "reference_id": reference,
        "charges": [{"status": "PAID"}]
    })
}

async fn history_for(app: &TestApp, user_id: Uuid, order_id: &str) -> Vec<purchase_history::Model> {
    PurchaseHistory::find()
        .filter(purchase_history::Column::UserId.eq(user_id))
        .filter(purchase_history::Column::OrderId.eq(order_id))
        .all(&*app.db)
        .await
        .unwrap()
}

#[tokio::test]
async fn paid_webhook_converts_pending_purchase_into_history() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let token = app.token_for(user_id);
    let reference = checkout(&app, Some(token.as_str())).await;

    let response = app
        .post_raw(
            "/api/v1/payments/webhook",
            Some("application/json"),
            paid_webhook(&reference).to_string().as_bytes(),
            &[],
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["received"], true);
    assert_eq!(body["processed"], true);

    let records = history_for(&app, user_id, &reference).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].quantity, 2);
    assert_eq!(records[0].product_price, dec!(29.90));
    assert_eq!(records[0].product_title, "Livro A");
    assert_eq!(records[0].product_handle, "livro-a");

    // The staging row is consumed
    let pending = PendingPurchase::find_by_id(reference.clone())
        .one(&*app.db)
        .await
        .unwrap();
    assert!(pending.is_none());
}

#[tokio::test]
async fn webhook_redelivery_is_a_no_op() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let token = app.token_for(user_id);
    let reference = checkout(&app, Some(token.as_str())).await;

    let first = app
        .post_raw(
            "/api/v1/payments/webhook",
            Some("application/json"),
            paid_webhook(&reference).to_string().as_bytes(),
            &[],
        )
        .await;
    assert_eq!(response_json(first).await["processed"], true);

    // The processor redelivers the same notification
    let second = app
        .post_raw(
            "/api/v1/payments/webhook",
            Some("application/json"),
            paid_webhook(&reference).to_string().as_bytes(),
            &[],
        )
        .await;
    assert_eq!(second.status(), 200);
    let body = response_json(second).await;
    assert_eq!(body["processed"], false);
    assert_eq!(body["reason"], "unknown_reference");

    assert_eq!(history_for(&app, user_id, &reference).await.len(), 1);
}

#[tokio::test]
async fn unconfirmed_payment_leaves_pending_purchase_untouched() {
    let app = TestApp::new().await;
    let token = app.token_for(Uuid::new_v4());
    let reference = checkout(&app, Some(token.as_str())).await;

    let response = app
        .post_raw(
            "/api/v1/payments/webhook",
            Some("application/json"),
            json!({"reference_id": reference, "charges": [{"status": "PENDING"}]})
                .to_string()
                .as_bytes(),
            &[],
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["processed"], false);
    assert_eq!(body["reason"], "payment_not_confirmed");

    // Still pending, awaiting a later notification
    assert!(PendingPurchase::find_by_id(reference)
        .one(&*app.db)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn anonymous_pending_purchase_is_never_reconciled_by_webhook() {
    let app = TestApp::new().await;
    let reference = checkout(&app, None).await;

    let response = app
        .post_raw(
            "/api/v1/payments/webhook",
            Some("application/json"),
            paid_webhook(&reference).to_string().as_bytes(),
            &[],
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["processed"], false);
    assert_eq!(body["reason"], "anonymous_user");

    // No history anywhere, and the staging row remains for the expiry job
    assert!(PurchaseHistory::find().all(&*app.db).await.unwrap().is_empty());
    assert!(PendingPurchase::find_by_id(reference)
        .one(&*app.db)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn unrecognized_payload_is_acknowledged_not_rejected() {
    let app = TestApp::new().await;

    let response = app
        .post_raw(
            "/api/v1/payments/webhook",
            Some("application/octet-stream"),
            b"%%%definitely-not-a-notification%%%",
            &[],
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["received"], true);
    assert_eq!(body["processed"], false);
    assert_eq!(body["reason"], "unrecognized_payload");
}

#[tokio::test]
async fn foreign_reference_is_acknowledged_but_ignored() {
    let app = TestApp::new().await;

    let response = app
        .post_raw(
            "/api/v1/payments/webhook",
            Some("application/json"),
            json!({"reference_id": "someone-elses-order-42", "status": "PAID"})
                .to_string()
                .as_bytes(),
            &[],
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["processed"], false);
    assert_eq!(body["reason"], "foreign_reference");
}

#[tokio::test]
async fn legacy_form_encoded_webhook_is_supported() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let token = app.token_for(user_id);
    let reference = checkout(&app, Some(token.as_str())).await;

    let body = format!("reference_id={}&status=PAID", reference);
    let response = app
        .post_raw(
            "/api/v1/payments/webhook",
            Some("application/x-www-form-urlencoded"),
            body.as_bytes(),
            &[],
        )
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(response_json(response).await["processed"], true);
    assert_eq!(history_for(&app, user_id, &reference).await.len(), 1);
}

#[tokio::test]
async fn client_recorder_writes_history_once() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let token = app.token_for(user_id);
    let reference = checkout(&app, Some(token.as_str())).await;

    let payload = json!({
        "referenceId": reference,
        "items": [
            {"name": "Livro A", "price": 29.90, "quantity": 2},
            {"name": "Dom Casmurro", "price": 45.00, "quantity": 1}
        ]
    });

    let response = app
        .post_json("/api/v1/purchases/record", payload.clone(), Some(token.as_str()), None)
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["recordsCount"], 2);

    // Resubmitting from a reloaded success page is a safe no-op
    let again = app
        .post_json("/api/v1/purchases/record", payload, Some(token.as_str()), None)
        .await;
    assert_eq!(again.status(), 200);
    assert_eq!(response_json(again).await["recordsCount"], 0);

    let records = history_for(&app, user_id, &reference).await;
    assert_eq!(records.len(), 2);

    // The recorder also cleans up the staging row
    assert!(PendingPurchase::find_by_id(reference)
        .one(&*app.db)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn recorder_then_webhook_records_exactly_once() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let token = app.token_for(user_id);
    let reference = checkout(&app, Some(token.as_str())).await;

    let response = app
        .post_json(
            "/api/v1/purchases/record",
            json!({
                "referenceId": reference,
                "items": [{"name": "Livro A", "price": 29.90, "quantity": 2}]
            }),
            Some(token.as_str()),
            None,
        )
        .await;
    assert_eq!(response_json(response).await["recordsCount"], 1);

    // The webhook arrives after the client already recorded: the staging
    // row is gone, so it must no-op instead of double-writing
    let webhook = app
        .post_raw(
            "/api/v1/payments/webhook",
            Some("application/json"),
            paid_webhook(&reference).to_string().as_bytes(),
            &[],
        )
        .await;
    let body = response_json(webhook).await;
    assert_eq!(body["processed"], false);
    assert_eq!(body["reason"], "unknown_reference");

    assert_eq!(history_for(&app, user_id, &reference).await.len(), 1);
}

#[tokio::test]
async fn recorder_requires_authentication_and_a_payload() {
    let app = TestApp::new().await;
    let token = app.token_for(Uuid::new_v4());

    let payload = json!({
        "referenceId": "order_1_deadbeef",
        "items": [{"name": "Livro A", "price": 29.90, "quantity": 1}]
    });

    let unauthenticated = app
        .post_json("/api/v1/purchases/record", payload.clone(), None, None)
        .await;
    assert_eq!(unauthenticated.status(), 401);

    let empty_items = app
        .post_json(
            "/api/v1/purchases/record",
            json!({"referenceId": "order_1_deadbeef", "items": []}),
            Some(token.as_str()),
            None,
        )
        .await;
    assert_eq!(empty_items.status(), 400);

    let empty_reference = app
        .post_json(
            "/api/v1/purchases/record",
            json!({"referenceId": "", "items": [{"name": "Livro A", "price": 29.90, "quantity": 1}]}),
            Some(token.as_str()),
            None,
        )
        .await;
    assert_eq!(empty_reference.status(), 400);
}

#[tokio::test]
async fn purchase_history_listing_is_scoped_to_the_caller() {
    let app = TestApp::new().await;
    let reader = Uuid::new_v4();
    let other = Uuid::new_v4();
    let reader_token = app.token_for(reader);
    let other_token = app.token_for(other);

    for (token, title) in [(&reader_token, "Livro A"), (&other_token, "Livro B")] {
        let reference = checkout(&app, Some(token.as_str())).await;
        let response = app
            .post_json(
                "/api/v1/purchases/record",
                json!({
                    "referenceId": reference,
                    "items": [{"name": title, "price": 29.90, "quantity": 1}]
                }),
                Some(token.as_str()),
                None,
            )
            .await;
        assert_eq!(response.status(), 200);
    }

    let response = app.get("/api/v1/purchases?page=1&per_page=10", Some(reader_token.as_str())).await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["product_title"], "Livro A");

    let unauthenticated = app.get("/api/v1/purchases", None).await;
    assert_eq!(unauthenticated.status(), 401);
}

#[tokio::test]
async fn signed_webhooks_are_enforced_when_configured() {
    let app = TestApp::with_config(|config| {
        config.payment_webhook_secret = Some("webhook-shared-secret".to_string());
    })
    .await;
    let user_id = Uuid::new_v4();
    let token = app.token_for(user_id);
    let reference = checkout(&app, Some(token.as_str())).await;

    let payload = paid_webhook(&reference).to_string();

    let unsigned = app
        .post_raw(
            "/api/v1/payments/webhook",
            Some("application/json"),
            payload.as_bytes(),
            &[],
        )
        .await;
    assert_eq!(unsigned.status(), 401);

    let signature =
        livraria_api::security::create_hmac_signature(&payload, "webhook-shared-secret");
    let signed = app
        .post_raw(
            "/api/v1/payments/webhook",
            Some("application/json"),
            payload.as_bytes(),
            &[("x-webhook-signature", signature.as_str())],
        )
        .await;
    assert_eq!(signed.status(), 200);
    assert_eq!(response_json(signed).await["processed"], true);
    assert_eq!(history_for(&app, user_id, &reference).await.len(), 1);
}
