use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};
use crate::types::{CardDetails, Customer, LineItem, PurchaseStatus};

/// Order-creation side of the payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, order: &OrderRequest) -> AppResult<GatewayOrder>;
}

// Order request, in the gateway's wire format

#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    pub customer: GatewayCustomer,
    pub items: Vec<GatewayItem>,
    pub payments: Vec<GatewayPayment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayCustomer {
    pub name: String,
    pub email: String,
    pub document: String,
    pub document_type: &'static str,
    #[serde(rename = "type")]
    pub customer_type: &'static str,
    pub address: GatewayAddress,
    pub phones: GatewayPhones,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayAddress {
    pub line_1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_2: Option<String>,
    pub zip_code: String,
    pub city: String,
    pub state: String,
    pub country: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayPhones {
    pub mobile_phone: GatewayPhone,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayPhone {
    pub country_code: String,
    pub area_code: String,
    pub number: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayItem {
    pub code: String,
    /// Unit price in cents.
    pub amount: i64,
    pub description: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayPayment {
    pub payment_method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pix: Option<PixOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_card: Option<CreditCardOptions>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PixOptions {
    pub expires_in: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreditCardOptions {
    pub installments: u32,
    pub statement_descriptor: &'static str,
    pub card: GatewayCard,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayCard {
    pub number: String,
    pub holder_name: String,
    pub exp_month: u32,
    pub exp_year: u32,
    pub cvv: String,
    pub billing_address: GatewayAddress,
}

const STATEMENT_DESCRIPTOR: &str = "TELEPSI";

fn digits_only(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

impl From<&crate::types::Address> for GatewayAddress {
    fn from(address: &crate::types::Address) -> Self {
        Self {
            line_1: format!(
                "{}, {}, {}",
                address.number, address.street, address.neighborhood
            ),
            line_2: address.complement.clone().filter(|c| !c.is_empty()),
            zip_code: digits_only(&address.zip_code),
            city: address.city.clone(),
            state: address.state.to_uppercase(),
            country: address
                .country
                .clone()
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "BR".to_string()),
        }
    }
}

impl From<&Customer> for GatewayCustomer {
    fn from(customer: &Customer) -> Self {
        // Validation guarantees at least one phone
        let phone = customer.phones.first().cloned().unwrap_or_default();
        Self {
            name: customer.name.clone(),
            email: customer.email.clone(),
            document: digits_only(&customer.document),
            document_type: "CPF",
            customer_type: "individual",
            address: GatewayAddress::from(&customer.address),
            phones: GatewayPhones {
                mobile_phone: GatewayPhone {
                    country_code: phone.country_code.unwrap_or_else(|| "55".to_string()),
                    area_code: phone.area_code,
                    number: digits_only(&phone.number),
                },
            },
        }
    }
}

impl From<&LineItem> for GatewayItem {
    fn from(item: &LineItem) -> Self {
        let description = if item.description.is_empty() {
            item.title.clone()
        } else {
            format!("{} - {}", item.title, item.description)
        };
        Self {
            code: item.code.clone(),
            amount: item.unit_price,
            description,
            quantity: item.quantity,
        }
    }
}

impl OrderRequest {
    pub fn pix(customer: &Customer, items: &[LineItem], expires_in: u32) -> Self {
        Self {
            customer: customer.into(),
            items: items.iter().map(GatewayItem::from).collect(),
            payments: vec![GatewayPayment {
                payment_method: "pix",
                pix: Some(PixOptions { expires_in }),
                credit_card: None,
            }],
        }
    }

    pub fn credit_card(
        customer: &Customer,
        items: &[LineItem],
        card: &CardDetails,
        installments: u32,
    ) -> Self {
        let customer = GatewayCustomer::from(customer);
        let billing_address = customer.address.clone();
        Self {
            customer,
            items: items.iter().map(GatewayItem::from).collect(),
            payments: vec![GatewayPayment {
                payment_method: "credit_card",
                pix: None,
                credit_card: Some(CreditCardOptions {
                    installments,
                    statement_descriptor: STATEMENT_DESCRIPTOR,
                    card: GatewayCard {
                        number: digits_only(&card.number),
                        holder_name: card.holder_name.clone(),
                        exp_month: card.exp_month,
                        exp_year: card.exp_year,
                        cvv: card.cvv.clone(),
                        billing_address,
                    },
                }),
            }],
        }
    }
}

// Order response

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct GatewayOrder {
    pub id: String,
    #[serde(default)]
    pub code: Option<String>,
    pub status: String,
    #[serde(default)]
    pub charges: Vec<GatewayCharge>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct GatewayCharge {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub last_transaction: Option<GatewayTransaction>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct GatewayTransaction {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub qr_code: Option<String>,
    #[serde(default)]
    pub qr_code_url: Option<String>,
}

impl GatewayOrder {
    pub fn last_transaction(&self) -> Option<&GatewayTransaction> {
        self.charges
            .iter()
            .rev()
            .find_map(|charge| charge.last_transaction.as_ref())
    }

    /// Local status implied by the last transaction, if it is one we track.
    pub fn purchase_status(&self) -> Option<PurchaseStatus> {
        self.last_transaction()
            .and_then(|transaction| PurchaseStatus::from_transaction_status(&transaction.status))
    }
}

/// HTTP client for the Pagar.me Core v5 API.
#[derive(Clone)]
pub struct PagarmeClient {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl PagarmeClient {
    pub fn new(base_url: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        }
    }
}

#[async_trait]
impl PaymentGateway for PagarmeClient {
    async fn create_order(&self, order: &OrderRequest) -> AppResult<GatewayOrder> {
        let url = format!("{}/orders", self.base_url);

        let res = self
            .client
            .post(&url)
            .basic_auth(&self.secret_key, Some(""))
            .json(order)
            .send()
            .await
            .map_err(AppError::from)?;

        let status = res.status();
        if status.is_success() {
            res.json::<GatewayOrder>()
                .await
                .map_err(|e| AppError::GatewayResponseParse(e.to_string()))
        } else {
            let body = res.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "Payment gateway rejected order");
            Err(AppError::Gateway {
                status: status.as_u16(),
                body,
            })
        }
    }
}
