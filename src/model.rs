use crate::types::{PurchaseStatus, PurchaseView};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

#[derive(Queryable, Insertable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: String,
    pub nome: String,
    pub email: String,
    pub creditos: i64,
    pub created_at: NaiveDateTime,
}

impl User {
    pub fn new(id: String, nome: String, email: String, creditos: i64) -> Self {
        Self {
            id,
            nome,
            email,
            creditos,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }
}

/// A credit purchase (`Compra`) tracked against the gateway order id.
#[derive(Queryable, Insertable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::compras)]
pub struct Purchase {
    pub id: String,
    pub user_id: String,
    pub payment_id: String,
    pub status: PurchaseStatus,
    pub qtd_creditos: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Purchase {
    pub fn new(
        user_id: String,
        payment_id: String,
        status: PurchaseStatus,
        qtd_creditos: Option<i64>,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            payment_id,
            status,
            qtd_creditos,
            created_at: now,
            updated_at: now,
        }
    }
}

impl From<Purchase> for PurchaseView {
    fn from(purchase: Purchase) -> Self {
        Self {
            id: purchase.id,
            user_id: purchase.user_id,
            payment_id: purchase.payment_id,
            status: purchase.status,
            qtd_creditos: purchase.qtd_creditos,
            created_at: purchase.created_at,
            updated_at: purchase.updated_at,
        }
    }
}

/// Row of `acesso_anamnese_temp`. Use [`AnamnesisAccess::state`] instead of
/// reading the nullable columns directly.
#[derive(Queryable, Insertable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::acesso_anamnese_temp)]
pub struct AnamnesisAccess {
    pub id: String,
    pub token: String,
    pub paciente_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub accessed_at: Option<NaiveDateTime>,
    pub ip: Option<String>,
}

impl AnamnesisAccess {
    pub fn new(paciente_id: Option<String>, created_at: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            token: Uuid::new_v4().simple().to_string(),
            paciente_id,
            created_at,
            accessed_at: None,
            ip: None,
        }
    }
}
