use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, AppState};

/// Claims issued by the platform's session provider.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// The user behind an authenticated internal request.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub user_id: String,
}

/// Checks the gateway's `Authorization` header against the precomputed
/// Basic value.
pub fn verify_webhook_authorization(header_value: Option<&HeaderValue>, expected: &str) -> bool {
    let Some(provided) = header_value.and_then(|h| h.to_str().ok()) else {
        return false;
    };
    constant_time_eq(provided.as_bytes(), expected.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub fn decode_session_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!("Rejected session token: {}", e);
        AppError::Unauthorized
    })
}

/// Session authentication middleware for `/api/internal`.
/// Validates the bearer JWT and exposes the caller as [`SessionUser`].
pub async fn session_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let claims = decode_session_token(token, &state.config.session_jwt_secret)?;

    req.extensions_mut().insert(SessionUser {
        user_id: claims.sub,
    });

    Ok(next.run(req).await)
}
