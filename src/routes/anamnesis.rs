use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};

use crate::anamnesis::{self, Access};
use crate::auth::SessionUser;
use crate::error::AppResult;
use crate::types::{
    IssueLinkRequest, IssuedLink, LinkCheckResponse, LinkDeleteResponse, LinkErrorBody,
};
use crate::AppState;

const TOKEN_NOT_FOUND: &str = "Token não encontrado";
const TOKEN_INVALID: &str = "Token inválido";

/// Address of the caller as seen by the outermost trusted proxy.
///
/// With `n` trusted hops the client is the `n`-th `X-Forwarded-For` entry
/// from the right; entries further left were supplied by the client itself.
#[derive(Debug, Clone)]
pub struct ClientIp(pub Option<String>);

impl ClientIp {
    pub fn resolve(parts: &Parts, trusted_proxy_hops: usize) -> Self {
        let peer = || {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        };

        if trusted_proxy_hops == 0 {
            return ClientIp(peer());
        }

        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| forwarded_client(h, trusted_proxy_hops));

        let real_ip = || {
            parts
                .headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
                .map(str::to_string)
        };

        ClientIp(forwarded.or_else(real_ip).or_else(peer))
    }
}

fn forwarded_client(header: &str, trusted_proxy_hops: usize) -> Option<String> {
    let hops: Vec<&str> = header
        .split(',')
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .collect();
    let index = hops.len().saturating_sub(trusted_proxy_hops);
    hops.get(index).map(|ip| ip.to_string())
}

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(ClientIp::resolve(parts, state.config.trusted_proxy_hops))
    }
}

fn check_response(status: StatusCode, erro: Option<&str>) -> Response {
    (
        status,
        Json(LinkCheckResponse {
            autorizado: erro.is_none(),
            erro: erro.map(str::to_string),
        }),
    )
        .into_response()
}

fn error_response(status: StatusCode, erro: &str) -> Response {
    (
        status,
        Json(LinkErrorBody {
            erro: erro.to_string(),
        }),
    )
        .into_response()
}

/// Validate a temporary anamnesis link
///
/// The first load binds the link to the caller's IP.
#[utoipa::path(
    get,
    path = "/api/amnp/{token}",
    params(("token" = String, Path, description = "Link token")),
    responses(
        (status = 200, description = "Access authorized", body = LinkCheckResponse),
        (status = 400, description = "Malformed token or unknown client address", body = LinkCheckResponse),
        (status = 403, description = "Link expired or bound to another IP; link deleted", body = LinkCheckResponse),
        (status = 404, description = "Token not found", body = LinkCheckResponse)
    ),
    tag = "Anamnesis"
)]
pub async fn validate_anamnesis_link(
    State(app_state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    Path(token): Path<String>,
) -> Response {
    let token = token.trim();
    if token.is_empty() {
        return check_response(StatusCode::BAD_REQUEST, Some(TOKEN_INVALID));
    }
    let Some(client_ip) = client_ip else {
        return check_response(
            StatusCode::BAD_REQUEST,
            Some("Não foi possível identificar o IP de origem"),
        );
    };

    let now = chrono::Utc::now().naive_utc();
    let result = app_state
        .get_db_connection()
        .and_then(|mut conn| anamnesis::check_access(&mut conn, token, &client_ip, now));

    match result {
        Ok(Access::Authorized) => check_response(StatusCode::OK, None),
        Ok(Access::Revoked(reason)) => check_response(StatusCode::FORBIDDEN, Some(reason.message())),
        Ok(Access::NotFound) => check_response(StatusCode::NOT_FOUND, Some(TOKEN_NOT_FOUND)),
        Err(e) => {
            tracing::error!("Failed to validate anamnesis link: {}", e);
            sentry::capture_error(&e);
            check_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                Some("Erro interno do servidor"),
            )
        }
    }
}

/// Revoke a temporary anamnesis link
#[utoipa::path(
    delete,
    path = "/api/amnp/{token}",
    params(("token" = String, Path, description = "Link token")),
    responses(
        (status = 200, description = "Link deleted", body = LinkDeleteResponse),
        (status = 400, description = "Malformed token", body = LinkErrorBody),
        (status = 404, description = "Token not found", body = LinkErrorBody),
        (status = 500, description = "Internal error", body = LinkErrorBody)
    ),
    tag = "Anamnesis"
)]
pub async fn delete_anamnesis_link(
    State(app_state): State<AppState>,
    Path(token): Path<String>,
) -> Response {
    let token = token.trim();
    if token.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, TOKEN_INVALID);
    }

    let result = app_state
        .get_db_connection()
        .and_then(|mut conn| anamnesis::delete_link(&mut conn, token));

    match result {
        Ok(true) => (
            StatusCode::OK,
            Json(LinkDeleteResponse {
                sucesso: true,
                mensagem: "Token removido com sucesso".to_string(),
            }),
        )
            .into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, TOKEN_NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to delete anamnesis link: {}", e);
            sentry::capture_error(&e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Erro ao remover token")
        }
    }
}

/// Issue a new temporary anamnesis link
#[utoipa::path(
    post,
    path = "/api/internal/anamnesis/links",
    request_body = IssueLinkRequest,
    responses(
        (status = 200, description = "Link issued", body = IssuedLink),
        (status = 401, description = "Missing or invalid session")
    ),
    tag = "Anamnesis",
    security(("bearer_auth" = []))
)]
pub async fn issue_anamnesis_link(
    State(app_state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Json(payload): Json<IssueLinkRequest>,
) -> AppResult<Json<IssuedLink>> {
    let mut conn = app_state.get_db_connection()?;
    let access = anamnesis::issue_link(
        &mut conn,
        payload.paciente_id,
        chrono::Utc::now().naive_utc(),
    )?;

    tracing::info!(issued_by = %user.user_id, token_id = %access.id, "Anamnesis link issued");

    Ok(Json(IssuedLink {
        link: format!("/anamnese/{}", access.token),
        expires_at: anamnesis::unused_expiry(&access),
        token: access.token,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_client_skips_client_supplied_entries() {
        // Client sent a forged first hop, our proxy appended the real peer
        let header = "203.0.113.7, 198.51.100.4";
        assert_eq!(forwarded_client(header, 1).as_deref(), Some("198.51.100.4"));
        assert_eq!(forwarded_client(header, 2).as_deref(), Some("203.0.113.7"));
        assert_eq!(forwarded_client("198.51.100.4", 3).as_deref(), Some("198.51.100.4"));
        assert_eq!(forwarded_client(" , ", 1), None);
    }

    #[test]
    fn headers_are_ignored_without_trusted_proxies() {
        let (mut parts, _) = axum::http::Request::builder()
            .header("x-forwarded-for", "203.0.113.7")
            .header("x-real-ip", "203.0.113.7")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(ClientIp::resolve(&parts, 0).0, None);

        parts
            .extensions
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 9], 4321))));
        assert_eq!(ClientIp::resolve(&parts, 0).0.as_deref(), Some("10.0.0.9"));
        assert_eq!(ClientIp::resolve(&parts, 1).0.as_deref(), Some("203.0.113.7"));
    }
}
