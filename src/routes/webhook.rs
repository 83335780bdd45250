use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::auth::verify_webhook_authorization;
use crate::error::AppResult;
use crate::ledger::{self, DeliveryOutcome, StatusUpdate};
use crate::types::{PurchaseStatus, WebhookAck, WebhookEvent};
use crate::AppState;

/// Liveness probe for the gateway dashboard
#[utoipa::path(
    get,
    path = "/api/webhook/pagarme",
    responses((status = 200, description = "Webhook endpoint is up", body = serde_json::Value)),
    tag = "Webhook"
)]
pub async fn webhook_liveness() -> Json<serde_json::Value> {
    Json(json!({ "message": "Webhook ativo e funcionando!" }))
}

/// Receive payment status callbacks from the gateway
///
/// Once authenticated and parsed the request is always acknowledged with
/// 200, so processing failures never trigger gateway redelivery storms.
#[utoipa::path(
    post,
    path = "/api/webhook/pagarme",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Event received", body = WebhookAck),
        (status = 400, description = "Unparsable body"),
        (status = 401, description = "Bad or missing Basic credentials")
    ),
    tag = "Webhook"
)]
pub async fn handle_pagarme_webhook(
    State(app_state): State<AppState>,
    header_map: HeaderMap,
    body: Bytes,
) -> Response {
    let expected = app_state.config.webhook_authorization();
    if !verify_webhook_authorization(header_map.get(AUTHORIZATION), &expected) {
        tracing::warn!("Webhook authentication failed");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        )
            .into_response();
    }

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("Failed to parse webhook body: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Webhook error" })),
            )
                .into_response();
        }
    };

    tracing::info!(
        event_id = ?event.id,
        event_type = %event.event_type,
        order_id = %event.data.id,
        "Received gateway webhook"
    );

    if let Err(e) = process_event(&app_state, &event) {
        tracing::error!(
            event_type = %event.event_type,
            order_id = %event.data.id,
            "Failed to process webhook: {}",
            e
        );
        sentry::capture_error(&e);
    }

    (StatusCode::OK, Json(WebhookAck { received: true })).into_response()
}

fn process_event(app_state: &AppState, event: &WebhookEvent) -> AppResult<()> {
    let Some(status) = PurchaseStatus::from_webhook_event(&event.event_type) else {
        tracing::info!(event_type = %event.event_type, "Ignoring unhandled webhook event");
        return Ok(());
    };

    let mut conn = app_state.get_db_connection()?;
    let candidates = event.candidate_payment_ids();

    let payment_id = match ledger::apply_status(&mut conn, &candidates, status)? {
        StatusUpdate::Updated { payment_id } => {
            tracing::info!(payment_id = %payment_id, status = %status, "Purchase status updated");
            payment_id
        }
        StatusUpdate::AlreadyDelivered { payment_id } => {
            tracing::info!(payment_id = %payment_id, "Purchase already delivered, status kept");
            payment_id
        }
        StatusUpdate::NotFound => {
            tracing::warn!(order_id = %event.data.id, "No purchase matches webhook order");
            return Ok(());
        }
    };

    if status != PurchaseStatus::Paid {
        return Ok(());
    }

    match ledger::deliver_credits(&mut conn, &payment_id)? {
        DeliveryOutcome::Delivered {
            user_id,
            credits,
            balance,
        } => tracing::info!(
            payment_id = %payment_id,
            user_id = %user_id,
            credits,
            balance,
            "Credits delivered"
        ),
        DeliveryOutcome::AlreadyDelivered => {
            tracing::info!(payment_id = %payment_id, "Credits already delivered, skipping")
        }
        DeliveryOutcome::NotPaid(current) => tracing::warn!(
            payment_id = %payment_id,
            status = %current,
            "Purchase not paid, credits withheld"
        ),
        DeliveryOutcome::NotFound => {
            tracing::warn!(payment_id = %payment_id, "Purchase vanished before delivery")
        }
    }

    Ok(())
}
