use axum::{extract::State, Extension, Json};

use crate::{
    auth::SessionUser,
    error::AppResult,
    ledger,
    types::{ConsumeCreditsRequest, CreditBalance},
    AppState,
};

/// Current credit balance of the caller
///
/// Requires a session JWT in the Authorization header
#[utoipa::path(
    get,
    path = "/api/internal/credits",
    responses(
        (status = 200, description = "Current balance", body = CreditBalance),
        (status = 401, description = "Unauthorized - Invalid or missing session token"),
        (status = 404, description = "Unknown user")
    ),
    tag = "Credits",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_credit_balance(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> AppResult<Json<CreditBalance>> {
    let mut conn = state.get_db_connection()?;
    let creditos = ledger::credit_balance(&mut conn, &user.user_id)?;

    Ok(Json(CreditBalance {
        user_id: user.user_id,
        creditos,
    }))
}

/// Spend credits from the caller's balance
///
/// Requires a session JWT in the Authorization header
#[utoipa::path(
    post,
    path = "/api/internal/credits/consume",
    request_body = ConsumeCreditsRequest,
    responses(
        (status = 200, description = "Credits consumed", body = CreditBalance),
        (status = 400, description = "Invalid amount or insufficient credits"),
        (status = 401, description = "Unauthorized - Invalid or missing session token"),
        (status = 404, description = "Unknown user")
    ),
    tag = "Credits",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn consume_credits(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Json(payload): Json<ConsumeCreditsRequest>,
) -> AppResult<Json<CreditBalance>> {
    let mut conn = state.get_db_connection()?;
    let creditos = ledger::consume_credits(&mut conn, &user.user_id, payload.amount)?;

    tracing::info!(user_id = %user.user_id, amount = payload.amount, creditos, "Credits consumed");

    Ok(Json(CreditBalance {
        user_id: user.user_id,
        creditos,
    }))
}
