//! Purchase records and the credit balance they feed.
//!
//! Credits only ever reach a balance through [`deliver_credits`], which flips
//! a `PAID` purchase to `entregue` with a conditional update inside an
//! immediate (write-locking) transaction and credits the buyer only when that
//! update claimed the row.

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use crate::error::{AppError, AppResult};
use crate::model::{Purchase, User};
use crate::schema::{compras, users};
use crate::types::PurchaseStatus;

/// Result of applying a webhook status to a purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Updated { payment_id: String },
    AlreadyDelivered { payment_id: String },
    NotFound,
}

/// Result of a credit delivery attempt. Only `Delivered` changed anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered {
        user_id: String,
        credits: i64,
        balance: i64,
    },
    AlreadyDelivered,
    NotPaid(PurchaseStatus),
    NotFound,
}

pub fn find_user(conn: &mut SqliteConnection, user_id: &str) -> AppResult<Option<User>> {
    Ok(users::table
        .find(user_id)
        .select(User::as_select())
        .first(conn)
        .optional()?)
}

pub fn find_purchase(conn: &mut SqliteConnection, payment_id: &str) -> AppResult<Option<Purchase>> {
    Ok(compras::table
        .filter(compras::payment_id.eq(payment_id))
        .select(Purchase::as_select())
        .first(conn)
        .optional()?)
}

/// Creates or refreshes the purchase for `payment_id`.
///
/// A purchase is never moved to or out of `entregue` here, and a
/// `payment_id` stays bound to the user that first recorded it. The credit
/// quantity is fixed when the row is created; later calls only move the
/// status.
pub fn record_purchase(
    conn: &mut SqliteConnection,
    user_id: &str,
    payment_id: &str,
    status: PurchaseStatus,
    qtd_creditos: Option<i64>,
) -> AppResult<Purchase> {
    if status == PurchaseStatus::Delivered {
        return Err(AppError::BadRequest(
            "status entregue não pode ser definido manualmente".to_string(),
        ));
    }

    conn.immediate_transaction(|conn| {
        let existing = find_purchase(conn, payment_id)?;

        match existing {
            Some(purchase) if purchase.user_id != user_id => Err(AppError::PaymentIdAlreadyUsed),
            Some(purchase) if purchase.status == PurchaseStatus::Delivered => {
                Err(AppError::PurchaseAlreadyDelivered)
            }
            Some(purchase) => {
                diesel::update(compras::table.find(&purchase.id))
                    .set((
                        compras::status.eq(status),
                        compras::updated_at.eq(chrono::Utc::now().naive_utc()),
                    ))
                    .execute(conn)?;

                Ok(compras::table
                    .find(&purchase.id)
                    .select(Purchase::as_select())
                    .first(conn)?)
            }
            None => {
                let purchase = Purchase::new(
                    user_id.to_string(),
                    payment_id.to_string(),
                    status,
                    qtd_creditos,
                );
                diesel::insert_into(compras::table)
                    .values(&purchase)
                    .execute(conn)?;
                Ok(purchase)
            }
        }
    })
}

/// Moves the first purchase matching one of `payment_ids` to `status`.
/// Applying the same status twice is harmless; delivered purchases are left
/// untouched.
pub fn apply_status(
    conn: &mut SqliteConnection,
    payment_ids: &[&str],
    status: PurchaseStatus,
) -> AppResult<StatusUpdate> {
    for payment_id in payment_ids {
        let updated = diesel::update(
            compras::table
                .filter(compras::payment_id.eq(*payment_id))
                .filter(compras::status.ne(PurchaseStatus::Delivered)),
        )
        .set((
            compras::status.eq(status),
            compras::updated_at.eq(chrono::Utc::now().naive_utc()),
        ))
        .execute(conn)?;

        if updated > 0 {
            return Ok(StatusUpdate::Updated {
                payment_id: payment_id.to_string(),
            });
        }

        if find_purchase(conn, payment_id)?.is_some() {
            return Ok(StatusUpdate::AlreadyDelivered {
                payment_id: payment_id.to_string(),
            });
        }
    }

    Ok(StatusUpdate::NotFound)
}

/// Credits a paid purchase to its buyer exactly once.
pub fn deliver_credits(conn: &mut SqliteConnection, payment_id: &str) -> AppResult<DeliveryOutcome> {
    conn.immediate_transaction(|conn| {
        let Some(purchase) = find_purchase(conn, payment_id)? else {
            return Ok(DeliveryOutcome::NotFound);
        };

        match (purchase.status, purchase.qtd_creditos) {
            (PurchaseStatus::Delivered, _) | (PurchaseStatus::Paid, None) => {
                return Ok(DeliveryOutcome::AlreadyDelivered)
            }
            (PurchaseStatus::Paid, Some(_)) => {}
            (other, _) => return Ok(DeliveryOutcome::NotPaid(other)),
        }

        let claimed = diesel::update(
            compras::table
                .find(&purchase.id)
                .filter(compras::status.eq(PurchaseStatus::Paid))
                .filter(compras::qtd_creditos.is_not_null()),
        )
        .set((
            compras::status.eq(PurchaseStatus::Delivered),
            compras::qtd_creditos.eq(None::<i64>),
            compras::updated_at.eq(chrono::Utc::now().naive_utc()),
        ))
        .execute(conn)?;

        if claimed == 0 {
            return Ok(DeliveryOutcome::AlreadyDelivered);
        }

        let credits = purchase.qtd_creditos.unwrap_or_default();
        let credited = diesel::update(users::table.find(&purchase.user_id))
            .set(users::creditos.eq(users::creditos + credits))
            .execute(conn)?;

        // Rolls back the claim above
        if credited == 0 {
            return Err(AppError::UserNotFound);
        }

        let balance = users::table
            .find(&purchase.user_id)
            .select(users::creditos)
            .first::<i64>(conn)?;

        Ok(DeliveryOutcome::Delivered {
            user_id: purchase.user_id,
            credits,
            balance,
        })
    })
}

pub fn credit_balance(conn: &mut SqliteConnection, user_id: &str) -> AppResult<i64> {
    users::table
        .find(user_id)
        .select(users::creditos)
        .first::<i64>(conn)
        .optional()?
        .ok_or(AppError::UserNotFound)
}

/// Spends `amount` credits if the balance covers them; returns the new balance.
pub fn consume_credits(conn: &mut SqliteConnection, user_id: &str, amount: i64) -> AppResult<i64> {
    if amount <= 0 {
        return Err(AppError::BadRequest(
            "quantidade de créditos deve ser positiva".to_string(),
        ));
    }

    conn.immediate_transaction(|conn| {
        let updated = diesel::update(
            users::table
                .find(user_id)
                .filter(users::creditos.ge(amount)),
        )
        .set(users::creditos.eq(users::creditos - amount))
        .execute(conn)?;

        if updated == 0 {
            // Distinguish a missing user from a short balance
            credit_balance(conn, user_id)?;
            return Err(AppError::InsufficientCredits);
        }

        credit_balance(conn, user_id)
    })
}
