use axum::extract::{Path, State};
use axum::{Extension, Json};
use validator::Validate;

use crate::auth::SessionUser;
use crate::error::{AppError, AppResult};
use crate::gateway::{GatewayOrder, OrderRequest};
use crate::ledger;
use crate::types::{
    CardPaymentRequest, PaymentIntentResponse, PixPaymentRequest, PurchaseStatus, PurchaseView,
    SavePaymentRequest,
};
use crate::AppState;

/// Route the buyer is sent to for scanning the PIX QR code.
fn qr_code_route(payment_id: &str) -> String {
    format!("/pagamento/pix/{}", payment_id)
}

/// Submits the order and records the local purchase from the gateway's
/// immediate answer. Nothing is written when the gateway call fails.
async fn submit_order(
    state: &AppState,
    user_id: &str,
    order_request: &OrderRequest,
    qtd_creditos: i64,
) -> AppResult<(GatewayOrder, Option<PurchaseStatus>)> {
    {
        let mut conn = state.get_db_connection()?;
        ledger::find_user(&mut conn, user_id)?.ok_or(AppError::UserNotFound)?;
    }

    let order = state.gateway.create_order(order_request).await?;

    let status = order.purchase_status();
    match status {
        Some(status) => {
            let mut conn = state.get_db_connection()?;
            ledger::record_purchase(&mut conn, user_id, &order.id, status, Some(qtd_creditos))?;
            tracing::info!(
                user_id = %user_id,
                payment_id = %order.id,
                status = %status,
                qtd_creditos,
                "Purchase recorded"
            );

            // A paid answer may beat the purchase row to the webhook
            if status == PurchaseStatus::Paid {
                let outcome = ledger::deliver_credits(&mut conn, &order.id)?;
                tracing::info!(payment_id = %order.id, ?outcome, "Delivery on paid order");
            }
        }
        None => {
            tracing::warn!(
                payment_id = %order.id,
                transaction_status = ?order.last_transaction().map(|t| t.status.as_str()),
                "Gateway returned an untracked transaction status, purchase not recorded"
            );
        }
    }

    Ok((order, status))
}

/// Create a PIX payment intent
///
/// Requires a session JWT in the Authorization header
#[utoipa::path(
    post,
    path = "/api/internal/payments/pix",
    request_body = PixPaymentRequest,
    responses(
        (status = 200, description = "Order created; QR code returned", body = PaymentIntentResponse),
        (status = 400, description = "Missing customer or item data"),
        (status = 401, description = "Missing or invalid session"),
        (status = 404, description = "Unknown buyer"),
        (status = 502, description = "Payment gateway failure")
    ),
    tag = "Payments",
    security(("bearer_auth" = []))
)]
pub async fn create_pix_payment(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Json(payload): Json<PixPaymentRequest>,
) -> AppResult<Json<PaymentIntentResponse>> {
    payload.validate()?;

    let order_request =
        OrderRequest::pix(&payload.customer, &payload.items, state.config.pix_expires_in);
    let (order, status) =
        submit_order(&state, &user.user_id, &order_request, payload.qtd_creditos).await?;

    let transaction = order.last_transaction().cloned();
    let qr_code = transaction.as_ref().and_then(|t| t.qr_code.clone());
    let qr_code_url = transaction.as_ref().and_then(|t| t.qr_code_url.clone());
    let redirect_to = match (&qr_code_url, status) {
        (Some(_), Some(PurchaseStatus::WaitingPayment | PurchaseStatus::Pending)) => {
            Some(qr_code_route(&order.id))
        }
        _ => None,
    };

    Ok(Json(PaymentIntentResponse {
        payment_id: order.id.clone(),
        status,
        qr_code,
        qr_code_url,
        redirect_to,
        order,
    }))
}

/// Create a credit card payment intent
///
/// Requires a session JWT in the Authorization header
#[utoipa::path(
    post,
    path = "/api/internal/payments/card",
    request_body = CardPaymentRequest,
    responses(
        (status = 200, description = "Order created", body = PaymentIntentResponse),
        (status = 400, description = "Missing customer, item or card data"),
        (status = 401, description = "Missing or invalid session"),
        (status = 404, description = "Unknown buyer"),
        (status = 502, description = "Payment gateway failure")
    ),
    tag = "Payments",
    security(("bearer_auth" = []))
)]
pub async fn create_card_payment(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Json(payload): Json<CardPaymentRequest>,
) -> AppResult<Json<PaymentIntentResponse>> {
    payload.validate()?;

    let order_request = OrderRequest::credit_card(
        &payload.customer,
        &payload.items,
        &payload.card,
        payload.installments.unwrap_or(1),
    );
    let (order, status) =
        submit_order(&state, &user.user_id, &order_request, payload.qtd_creditos).await?;

    Ok(Json(PaymentIntentResponse {
        payment_id: order.id.clone(),
        status,
        qr_code: None,
        qr_code_url: None,
        redirect_to: None,
        order,
    }))
}

/// Persist or update one of the caller's purchase records
///
/// `qtdCreditos` is only used when the purchase is new; an existing purchase
/// keeps the quantity it was created with.
#[utoipa::path(
    post,
    path = "/api/internal/payments/savepay",
    request_body = SavePaymentRequest,
    responses(
        (status = 200, description = "Purchase stored", body = PurchaseView),
        (status = 400, description = "Invalid status or paymentId owned by another user"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "userId is not the session user"),
        (status = 404, description = "Unknown user"),
        (status = 409, description = "Purchase already delivered")
    ),
    tag = "Payments",
    security(("bearer_auth" = []))
)]
pub async fn save_payment(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Json(payload): Json<SavePaymentRequest>,
) -> AppResult<Json<PurchaseView>> {
    if payload.user_id != user.user_id {
        tracing::warn!(
            session_user = %user.user_id,
            requested_user = %payload.user_id,
            "savepay for another user refused"
        );
        return Err(AppError::Forbidden);
    }
    if payload.payment_id.trim().is_empty() {
        return Err(AppError::BadRequest("paymentId é obrigatório".to_string()));
    }
    let status: PurchaseStatus = payload.stats.parse().map_err(AppError::BadRequest)?;
    if matches!(payload.qtd_creditos, Some(qtd) if qtd <= 0) {
        return Err(AppError::BadRequest(
            "quantidade de créditos inválida".to_string(),
        ));
    }

    let mut conn = state.get_db_connection()?;
    ledger::find_user(&mut conn, &user.user_id)?.ok_or(AppError::UserNotFound)?;

    let purchase = ledger::record_purchase(
        &mut conn,
        &user.user_id,
        &payload.payment_id,
        status,
        payload.qtd_creditos,
    )?;

    Ok(Json(purchase.into()))
}

/// Look up one of the caller's purchases
#[utoipa::path(
    get,
    path = "/api/internal/payments/{payment_id}",
    params(("payment_id" = String, Path, description = "Gateway order id")),
    responses(
        (status = 200, description = "Purchase found", body = PurchaseView),
        (status = 404, description = "No such purchase for this user")
    ),
    tag = "Payments",
    security(("bearer_auth" = []))
)]
pub async fn get_payment(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Path(payment_id): Path<String>,
) -> AppResult<Json<PurchaseView>> {
    let mut conn = state.get_db_connection()?;
    let purchase = ledger::find_purchase(&mut conn, &payment_id)?
        .filter(|purchase| purchase.user_id == user.user_id)
        .ok_or(AppError::PurchaseNotFound)?;

    Ok(Json(purchase.into()))
}
