use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

/// Application-specific error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database connection failed")]
    DatabaseConnection,

    #[error("Database operation failed: {0}")]
    DatabaseOperation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Acesso negado")]
    Forbidden,

    #[error("Usuário não encontrado")]
    UserNotFound,

    #[error("Compra não encontrada")]
    PurchaseNotFound,

    #[error("paymentId já pertence a outro usuário")]
    PaymentIdAlreadyUsed,

    #[error("Compra já entregue")]
    PurchaseAlreadyDelivered,

    #[error("Créditos insuficientes")]
    InsufficientCredits,

    #[error("{body}")]
    Gateway { status: u16, body: String },

    #[error("Failed to parse payment gateway response: {0}")]
    GatewayResponseParse(String),

    #[error("Failed to connect to payment gateway: {0}")]
    GatewayConnection(String),

    #[error("Network error: {0}")]
    NetworkError(String),
}

impl AppError {
    /// Get the appropriate HTTP status code for this error
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::DatabaseConnection | AppError::DatabaseOperation(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            AppError::BadRequest(_)
            | AppError::PaymentIdAlreadyUsed
            | AppError::InsufficientCredits => StatusCode::BAD_REQUEST,

            AppError::Unauthorized => StatusCode::UNAUTHORIZED,

            AppError::Forbidden => StatusCode::FORBIDDEN,

            AppError::UserNotFound | AppError::PurchaseNotFound => StatusCode::NOT_FOUND,

            AppError::PurchaseAlreadyDelivered => StatusCode::CONFLICT,

            // Upstream status is passed through when it is an error status
            AppError::Gateway { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|code| code.is_client_error() || code.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),

            AppError::GatewayResponseParse(_)
            | AppError::GatewayConnection(_)
            | AppError::NetworkError(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Internal details never reach the caller for 500s.
    fn message(&self) -> String {
        match self {
            AppError::DatabaseConnection | AppError::DatabaseOperation(_) => {
                "Erro interno do servidor".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code();

        if status_code.is_server_error() {
            tracing::error!(error = %self, "request failed");
            sentry::capture_error(&self);
        } else {
            tracing::debug!(error = %self, status = %status_code, "request rejected");
        }

        let body = serde_json::json!({ "error": self.message() });
        (status_code, Json(body)).into_response()
    }
}

/// Result type for application operations
pub type AppResult<T> = Result<T, AppError>;

impl From<diesel::result::Error> for AppError {
    fn from(err: diesel::result::Error) -> Self {
        AppError::DatabaseOperation(err.to_string())
    }
}

impl From<diesel::r2d2::PoolError> for AppError {
    fn from(_: diesel::r2d2::PoolError) -> Self {
        AppError::DatabaseConnection
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            AppError::NetworkError(err.to_string())
        } else {
            AppError::GatewayConnection(err.to_string())
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
