use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use diesel::deserialize::{self, FromSql};
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::gateway::GatewayOrder;

/// Local lifecycle of a `Compra`.
///
/// The first five values mirror the gateway; `Delivered` (stored as
/// `entregue`) is only ever written by the credit ledger and is terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, AsExpression, FromSqlRow, ToSchema,
)]
#[diesel(sql_type = Text)]
pub enum PurchaseStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "WAITING_PAYMENT")]
    WaitingPayment,
    #[serde(rename = "PROCESSING")]
    Processing,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "PAID")]
    Paid,
    #[serde(rename = "entregue")]
    Delivered,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "PENDING",
            PurchaseStatus::WaitingPayment => "WAITING_PAYMENT",
            PurchaseStatus::Processing => "PROCESSING",
            PurchaseStatus::Failed => "FAILED",
            PurchaseStatus::Paid => "PAID",
            PurchaseStatus::Delivered => "entregue",
        }
    }

    /// Maps the `status` of the gateway's last transaction right after an
    /// order is created.
    pub fn from_transaction_status(status: &str) -> Option<Self> {
        match status {
            "failed" => Some(PurchaseStatus::Failed),
            "waiting_payment" => Some(PurchaseStatus::WaitingPayment),
            "pending" => Some(PurchaseStatus::Pending),
            "paid" => Some(PurchaseStatus::Paid),
            _ => None,
        }
    }

    /// Maps a webhook `type` to the status it moves a purchase to.
    pub fn from_webhook_event(event_type: &str) -> Option<Self> {
        match event_type {
            pagarme_event_type::ORDER_PAID => Some(PurchaseStatus::Paid),
            pagarme_event_type::ORDER_PAYMENT_FAILED => Some(PurchaseStatus::Failed),
            pagarme_event_type::ORDER_PAYMENT_PROCESSING => Some(PurchaseStatus::Processing),
            pagarme_event_type::ORDER_PAYMENT_CANCELED => Some(PurchaseStatus::Failed),
            pagarme_event_type::ORDER_PAYMENT_PENDING => Some(PurchaseStatus::Pending),
            _ => None,
        }
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurchaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PurchaseStatus::Pending),
            "WAITING_PAYMENT" => Ok(PurchaseStatus::WaitingPayment),
            "PROCESSING" => Ok(PurchaseStatus::Processing),
            "FAILED" => Ok(PurchaseStatus::Failed),
            "PAID" => Ok(PurchaseStatus::Paid),
            "entregue" => Ok(PurchaseStatus::Delivered),
            other => Err(format!("Invalid purchase status: {}", other)),
        }
    }
}

impl ToSql<Text, Sqlite> for PurchaseStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        <str as ToSql<Text, Sqlite>>::to_sql(self.as_str(), out)
    }
}

impl FromSql<Text, Sqlite> for PurchaseStatus {
    fn from_sql(
        bytes: <Sqlite as diesel::backend::Backend>::RawValue<'_>,
    ) -> deserialize::Result<Self> {
        let status_str = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        status_str.parse().map_err(Into::into)
    }
}

// Webhook event types emitted by the payment gateway
pub mod pagarme_event_type {
    pub const ORDER_PAID: &str = "order.paid";
    pub const ORDER_PAYMENT_FAILED: &str = "order.payment_failed";
    pub const ORDER_PAYMENT_PROCESSING: &str = "order.payment_processing";
    pub const ORDER_PAYMENT_CANCELED: &str = "order.payment.canceled";
    pub const ORDER_PAYMENT_PENDING: &str = "order.payment.pending";
}

// Webhook envelope
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebhookEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookOrderData,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebhookOrderData {
    pub id: String,
    #[serde(default)]
    pub charges: Option<Vec<WebhookCharge>>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebhookCharge {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub last_transaction: Option<WebhookTransaction>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebhookTransaction {
    pub id: String,
}

impl WebhookEvent {
    /// Identifiers a purchase may be stored under, most specific first.
    pub fn candidate_payment_ids(&self) -> Vec<&str> {
        let mut ids = vec![self.data.id.as_str()];
        if let Some(charges) = &self.data.charges {
            ids.extend(
                charges
                    .iter()
                    .filter_map(|charge| charge.last_transaction.as_ref())
                    .map(|transaction| transaction.id.as_str()),
            );
        }
        ids
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

// Payment intent requests

fn validate_document(document: &str) -> Result<(), ValidationError> {
    let digits = document.chars().filter(char::is_ascii_digit).count();
    if digits == 11 {
        Ok(())
    } else {
        Err(ValidationError::new("cpf").with_message("CPF deve conter 11 dígitos".into()))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
#[serde(default)]
pub struct Customer {
    #[validate(length(min = 1, message = "nome do cliente é obrigatório"))]
    pub name: String,
    #[validate(email(message = "email do cliente inválido"))]
    pub email: String,
    #[validate(custom(function = "validate_document"))]
    pub document: String,
    #[validate(nested)]
    pub address: Address,
    #[validate(length(min = 1, message = "informe ao menos um telefone"), nested)]
    pub phones: Vec<Phone>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
#[serde(default)]
pub struct Address {
    #[validate(length(min = 1, message = "rua é obrigatória"))]
    pub street: String,
    #[validate(length(min = 1, message = "número é obrigatório"))]
    pub number: String,
    pub complement: Option<String>,
    #[validate(length(min = 1, message = "bairro é obrigatório"))]
    pub neighborhood: String,
    #[validate(length(min = 8, max = 9, message = "CEP inválido"))]
    pub zip_code: String,
    #[validate(length(min = 1, message = "cidade é obrigatória"))]
    pub city: String,
    #[validate(length(equal = 2, message = "UF inválida"))]
    pub state: String,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
#[serde(default)]
pub struct Phone {
    pub country_code: Option<String>,
    #[validate(length(min = 2, max = 3, message = "DDD inválido"))]
    pub area_code: String,
    #[validate(length(min = 8, max = 9, message = "telefone inválido"))]
    pub number: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
#[serde(default)]
pub struct LineItem {
    #[validate(length(min = 1, message = "código do produto é obrigatório"))]
    pub code: String,
    #[validate(length(min = 1, message = "título do produto é obrigatório"))]
    pub title: String,
    pub description: String,
    /// Price in cents.
    #[validate(range(min = 1, message = "preço unitário inválido"))]
    pub unit_price: i64,
    #[validate(range(min = 1, message = "quantidade inválida"))]
    pub quantity: i64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
#[serde(default)]
pub struct PixPaymentRequest {
    #[validate(nested)]
    pub customer: Customer,
    #[validate(length(min = 1, message = "nenhum item informado"), nested)]
    pub items: Vec<LineItem>,
    #[serde(rename = "qtdCreditos")]
    #[validate(range(min = 1, message = "quantidade de créditos inválida"))]
    pub qtd_creditos: i64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
#[serde(default)]
pub struct CardDetails {
    #[validate(length(min = 13, max = 19, message = "número do cartão inválido"))]
    pub number: String,
    #[validate(length(min = 1, message = "nome do titular é obrigatório"))]
    pub holder_name: String,
    #[validate(range(min = 1, max = 12, message = "mês de validade inválido"))]
    pub exp_month: u32,
    #[validate(range(min = 2000, max = 2100, message = "ano de validade inválido"))]
    pub exp_year: u32,
    #[validate(length(min = 3, max = 4, message = "CVV inválido"))]
    pub cvv: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
#[serde(default)]
pub struct CardPaymentRequest {
    #[validate(nested)]
    pub customer: Customer,
    #[validate(length(min = 1, message = "nenhum item informado"), nested)]
    pub items: Vec<LineItem>,
    #[serde(rename = "qtdCreditos")]
    #[validate(range(min = 1, message = "quantidade de créditos inválida"))]
    pub qtd_creditos: i64,
    #[validate(nested)]
    pub card: CardDetails,
    #[validate(range(min = 1, max = 12, message = "parcelamento inválido"))]
    pub installments: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentResponse {
    pub payment_id: String,
    pub status: Option<PurchaseStatus>,
    pub qr_code: Option<String>,
    pub qr_code_url: Option<String>,
    pub redirect_to: Option<String>,
    pub order: GatewayOrder,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct SavePaymentRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "paymentId")]
    pub payment_id: String,
    pub stats: String,
    #[serde(rename = "qtdCreditos")]
    pub qtd_creditos: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseView {
    pub id: String,
    pub user_id: String,
    pub payment_id: String,
    pub status: PurchaseStatus,
    pub qtd_creditos: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

// Credits

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreditBalance {
    pub user_id: String,
    pub creditos: i64,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ConsumeCreditsRequest {
    pub amount: i64,
}

// Anamnesis links

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct IssueLinkRequest {
    pub paciente_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssuedLink {
    pub token: String,
    pub link: String,
    pub expires_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LinkCheckResponse {
    pub autorizado: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub erro: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LinkDeleteResponse {
    pub sucesso: bool,
    pub mensagem: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LinkErrorBody {
    pub erro: String,
}
