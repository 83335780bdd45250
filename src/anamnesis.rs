//! Guard for the public anamnesis form link.
//!
//! A link is `Unused` until its first load, which binds it to the requesting
//! IP. Every later load must come from that IP inside the window opened by
//! the first access. Any violation deletes the row, so a revoked link and one
//! that never existed look the same to the caller.

use chrono::{Duration, NaiveDateTime};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use crate::error::AppResult;
use crate::model::AnamnesisAccess;
use crate::schema::acesso_anamnese_temp;

/// Lifetime of an unused link, and of a link after its first access.
pub const ACCESS_WINDOW_MINUTES: i64 = 10;

fn access_window() -> Duration {
    Duration::minutes(ACCESS_WINDOW_MINUTES)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Unused { created_at: NaiveDateTime },
    Bound { ip: String, bound_at: NaiveDateTime },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revocation {
    ExpiredUnused,
    Expired,
    IpMismatch,
}

impl Revocation {
    pub fn message(&self) -> &'static str {
        match self {
            Revocation::ExpiredUnused => "Link expirado (nunca utilizado)",
            Revocation::Expired => "Link expirado",
            Revocation::IpMismatch => "Acesso não autorizado para este IP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// First access: bind to the requester and allow.
    Bind,
    Allow,
    Revoke(Revocation),
}

/// Outcome of a validation request as seen by the route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Authorized,
    Revoked(Revocation),
    NotFound,
}

impl AnamnesisAccess {
    pub fn state(&self) -> LinkState {
        match self.accessed_at {
            None => LinkState::Unused {
                created_at: self.created_at,
            },
            // An access without a recorded IP never matches a requester
            Some(bound_at) => LinkState::Bound {
                ip: self.ip.clone().unwrap_or_default(),
                bound_at,
            },
        }
    }
}

pub fn evaluate(state: &LinkState, requester_ip: &str, now: NaiveDateTime) -> Verdict {
    match state {
        LinkState::Unused { created_at } => {
            if now > *created_at + access_window() {
                Verdict::Revoke(Revocation::ExpiredUnused)
            } else {
                Verdict::Bind
            }
        }
        LinkState::Bound { ip, bound_at } => {
            if ip != requester_ip {
                Verdict::Revoke(Revocation::IpMismatch)
            } else if now > *bound_at + access_window() {
                Verdict::Revoke(Revocation::Expired)
            } else {
                Verdict::Allow
            }
        }
    }
}

fn find_by_token(conn: &mut SqliteConnection, token: &str) -> AppResult<Option<AnamnesisAccess>> {
    Ok(acesso_anamnese_temp::table
        .filter(acesso_anamnese_temp::token.eq(token))
        .select(AnamnesisAccess::as_select())
        .first(conn)
        .optional()?)
}

pub fn issue_link(
    conn: &mut SqliteConnection,
    paciente_id: Option<String>,
    now: NaiveDateTime,
) -> AppResult<AnamnesisAccess> {
    let access = AnamnesisAccess::new(paciente_id, now);
    diesel::insert_into(acesso_anamnese_temp::table)
        .values(&access)
        .execute(conn)?;
    Ok(access)
}

/// Instant after which an unused link is rejected.
pub fn unused_expiry(access: &AnamnesisAccess) -> NaiveDateTime {
    access.created_at + access_window()
}

/// Validates one load of the form from `requester_ip` at `now`.
pub fn check_access(
    conn: &mut SqliteConnection,
    token: &str,
    requester_ip: &str,
    now: NaiveDateTime,
) -> AppResult<Access> {
    // A lost bind race is re-evaluated once against the winner's binding
    for _ in 0..2 {
        let Some(access) = find_by_token(conn, token)? else {
            return Ok(Access::NotFound);
        };

        match evaluate(&access.state(), requester_ip, now) {
            Verdict::Allow => return Ok(Access::Authorized),
            Verdict::Revoke(reason) => {
                diesel::delete(acesso_anamnese_temp::table.find(&access.id)).execute(conn)?;
                tracing::info!(token_id = %access.id, ?reason, "Anamnesis link revoked");
                return Ok(Access::Revoked(reason));
            }
            Verdict::Bind => {
                let bound = diesel::update(
                    acesso_anamnese_temp::table
                        .find(&access.id)
                        .filter(acesso_anamnese_temp::accessed_at.is_null()),
                )
                .set((
                    acesso_anamnese_temp::accessed_at.eq(Some(now)),
                    acesso_anamnese_temp::ip.eq(Some(requester_ip)),
                ))
                .execute(conn)?;

                if bound == 1 {
                    tracing::info!(token_id = %access.id, ip = %requester_ip, "Anamnesis link bound");
                    return Ok(Access::Authorized);
                }
            }
        }
    }

    // Bound by someone else between our two reads and then deleted
    Ok(Access::NotFound)
}

/// Removes a link regardless of its state. Returns whether it existed.
pub fn delete_link(conn: &mut SqliteConnection, token: &str) -> AppResult<bool> {
    let deleted = diesel::delete(
        acesso_anamnese_temp::table.filter(acesso_anamnese_temp::token.eq(token)),
    )
    .execute(conn)?;
    Ok(deleted > 0)
}
