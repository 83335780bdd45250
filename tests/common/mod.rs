#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use diesel::prelude::*;
use jsonwebtoken::{encode, EncodingKey, Header};
use telepsi_billing::auth::Claims;
use telepsi_billing::config::Config;
use telepsi_billing::db::{self, DbConnection, DbPool};
use telepsi_billing::error::{AppError, AppResult};
use telepsi_billing::gateway::{GatewayOrder, OrderRequest, PaymentGateway};
use telepsi_billing::model::{Purchase, User};
use telepsi_billing::schema::{compras, users};
use telepsi_billing::types::PurchaseStatus;
use telepsi_billing::AppState;

pub const WEBHOOK_USER: &str = "hook";
pub const WEBHOOK_PASSWORD: &str = "pass";
/// `Basic base64("hook:pass")`
pub const WEBHOOK_AUTH: &str = "Basic aG9vazpwYXNz";
pub const SESSION_SECRET: &str = "test-session-secret";

pub fn test_config(database_url: &str) -> Config {
    Config {
        database_url: database_url.to_string(),
        port: 0,
        db_pool_size: 4,
        pagarme_api_url: "http://127.0.0.1:9".to_string(),
        pagarme_secret_key: "sk_test".to_string(),
        webhook_user: WEBHOOK_USER.to_string(),
        webhook_password: WEBHOOK_PASSWORD.to_string(),
        session_jwt_secret: SESSION_SECRET.to_string(),
        pix_expires_in: 1800,
        trusted_proxy_hops: 1,
        sentry_dsn: None,
    }
}

/// Throw-away SQLite database, removed when dropped.
pub struct TestDb {
    db_path: String,
    pub pool: DbPool,
}

impl TestDb {
    pub fn new() -> Self {
        let db_path = std::env::temp_dir()
            .join(format!("telepsi_test_{}.db", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .into_owned();

        let pool = db::create_pool(&db_path, 4).unwrap();
        db::run_migrations(&mut pool.get().unwrap()).unwrap();

        Self { db_path, pool }
    }

    pub fn path(&self) -> &str {
        &self.db_path
    }

    pub fn conn(&self) -> DbConnection {
        self.pool.get().unwrap()
    }

    pub fn insert_user(&self, id: &str, creditos: i64) {
        let user = User::new(
            id.to_string(),
            format!("Usuário {}", id),
            format!("{}@example.com", id),
            creditos,
        );
        diesel::insert_into(users::table)
            .values(&user)
            .execute(&mut self.conn())
            .unwrap();
    }

    pub fn insert_purchase(
        &self,
        user_id: &str,
        payment_id: &str,
        status: PurchaseStatus,
        qtd_creditos: Option<i64>,
    ) {
        let purchase = Purchase::new(
            user_id.to_string(),
            payment_id.to_string(),
            status,
            qtd_creditos,
        );
        diesel::insert_into(compras::table)
            .values(&purchase)
            .execute(&mut self.conn())
            .unwrap();
    }

    pub fn balance(&self, user_id: &str) -> i64 {
        users::table
            .find(user_id)
            .select(users::creditos)
            .first(&mut self.conn())
            .unwrap()
    }

    pub fn purchase(&self, payment_id: &str) -> Option<Purchase> {
        compras::table
            .filter(compras::payment_id.eq(payment_id))
            .select(Purchase::as_select())
            .first(&mut self.conn())
            .optional()
            .unwrap()
    }

    pub fn purchase_count(&self) -> i64 {
        compras::table.count().get_result(&mut self.conn()).unwrap()
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", self.db_path, suffix));
        }
    }
}

/// Gateway double returning a canned order and recording what it was sent.
#[derive(Default)]
pub struct FakeGateway {
    pub response: Mutex<Option<AppResult<GatewayOrder>>>,
    pub calls: AtomicUsize,
    pub last_request: Mutex<Option<serde_json::Value>>,
}

impl FakeGateway {
    pub fn returning(order: serde_json::Value) -> Arc<Self> {
        let order: GatewayOrder = serde_json::from_value(order).unwrap();
        Arc::new(Self {
            response: Mutex::new(Some(Ok(order))),
            ..Default::default()
        })
    }

    pub fn failing(status: u16, body: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(Some(Err(AppError::Gateway {
                status,
                body: body.to_string(),
            }))),
            ..Default::default()
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(&self, order: &OrderRequest) -> AppResult<GatewayOrder> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(serde_json::to_value(order).unwrap());
        self.response
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(AppError::GatewayConnection("no canned response".to_string())))
    }
}

pub fn create_test_app(db: &TestDb, gateway: Arc<dyn PaymentGateway>) -> Router {
    let state = AppState::new(test_config(db.path()), db.pool.clone(), gateway);
    telepsi_billing::router(state)
}

pub fn session_token(user_id: &str) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SESSION_SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub fn authed_json_request(
    method: &str,
    uri: &str,
    user_id: &str,
    body: &serde_json::Value,
) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", session_token(user_id)))
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub async fn body_json(res: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
