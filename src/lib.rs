pub mod anamnesis;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod model;
pub mod routes;
pub mod schema;
pub mod types;

use axum::{
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Json},
    routing::{get, post},
    Router,
};
use config::Config;
use db::{DbConnection, DbPool};
use error::AppError;
use gateway::{PagarmeClient, PaymentGateway};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::OpenApi;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: DbPool,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            config: Arc::new(config),
            db,
            gateway,
        }
    }

    /// Get a pooled database connection
    pub fn get_db_connection(&self) -> Result<DbConnection, AppError> {
        self.db.get().map_err(|e| {
            tracing::error!("Failed to get database connection: {}", e);
            AppError::DatabaseConnection
        })
    }
}

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::webhook::webhook_liveness,
        routes::webhook::handle_pagarme_webhook,
        routes::anamnesis::validate_anamnesis_link,
        routes::anamnesis::delete_anamnesis_link,
        routes::anamnesis::issue_anamnesis_link,
        routes::payments::create_pix_payment,
        routes::payments::create_card_payment,
        routes::payments::save_payment,
        routes::payments::get_payment,
        routes::credits::get_credit_balance,
        routes::credits::consume_credits,
        health_check
    ),
    components(
        schemas(
            types::PurchaseStatus,
            types::PixPaymentRequest,
            types::CardPaymentRequest,
            types::PaymentIntentResponse,
            types::SavePaymentRequest,
            types::PurchaseView,
            types::CreditBalance,
            types::ConsumeCreditsRequest,
            types::IssueLinkRequest,
            types::IssuedLink,
            types::LinkCheckResponse,
            types::LinkDeleteResponse,
            types::LinkErrorBody,
            types::WebhookAck,
            gateway::GatewayOrder
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Payments", description = "PIX and credit card payment intents"),
        (name = "Webhook", description = "Payment gateway callbacks"),
        (name = "Credits", description = "Credit balance"),
        (name = "Anamnesis", description = "Temporary anamnesis form links"),
        (name = "Health", description = "Health check endpoints")
    ),
    info(
        title = "Telepsi Billing API",
        version = "1.0.0",
        description = "Credit purchases, gateway reconciliation and anamnesis link access control"
    )
)]
struct ApiDoc;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = serde_json::Value)
    ),
    tag = "Health"
)]
async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(serde_json::json!({"status": "ok"})))
}

async fn openapi_spec() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

async fn swagger_ui() -> impl IntoResponse {
    Html(include_str!("../static/swagger.html"))
}

pub fn router(app_state: AppState) -> Router {
    use routes::{anamnesis, credits, payments, webhook};

    let internal = Router::new()
        .route("/payments/pix", post(payments::create_pix_payment))
        .route("/payments/card", post(payments::create_card_payment))
        .route("/payments/savepay", post(payments::save_payment))
        .route("/payments/{payment_id}", get(payments::get_payment))
        .route("/credits", get(credits::get_credit_balance))
        .route("/credits/consume", post(credits::consume_credits))
        .route("/anamnesis/links", post(anamnesis::issue_anamnesis_link))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::session_auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/webhook/pagarme",
            get(webhook::webhook_liveness).post(webhook::handle_pagarme_webhook),
        )
        .route(
            "/api/amnp/{token}",
            get(anamnesis::validate_anamnesis_link).delete(anamnesis::delete_anamnesis_link),
        )
        .nest("/api/internal", internal)
        .route("/api-doc/openapi.json", get(openapi_spec))
        .route("/explore", get(swagger_ui))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "telepsi_billing=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub fn run() {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Must outlive the runtime so queued events are flushed on exit
    let _sentry = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(serve(config)) {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let pool = db::create_pool(&config.database_url, config.db_pool_size)?;
    let mut conn = pool.get()?;
    db::run_migrations(&mut conn)?;
    drop(conn);

    let gateway = Arc::new(PagarmeClient::new(
        config.pagarme_api_url.clone(),
        config.pagarme_secret_key.clone(),
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = router(AppState::new(config, pool, gateway));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
