// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Invite rows.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;

use locanda_core::LocandaError;

use crate::principals::StaffRole;

/// Invite lifetime from issuance.
pub const INVITE_TTL_DAYS: i64 = 7;

/// A one-time onboarding invite.
#[derive(Debug, Clone)]
pub struct Invite {
    pub token: String,
    pub role: StaffRole,
    pub name: String,
    pub issued_by: i64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub redeemed_by: Option<i64>,
    pub redeemed_at: Option<DateTime<Utc>>,
}

pub(crate) fn invite_from_row(row: &PgRow) -> Result<Invite, LocandaError> {
    let role: String = row.try_get("role").map_err(LocandaError::storage)?;
    let role = StaffRole::from_str(&role)
        .map_err(|_| LocandaError::Internal(format!("unknown staff role in invites: {role}")))?;

    Ok(Invite {
        token: row.try_get("token").map_err(LocandaError::storage)?,
        role,
        name: row.try_get("name").map_err(LocandaError::storage)?,
        issued_by: row.try_get("issued_by").map_err(LocandaError::storage)?,
        issued_at: row.try_get("issued_at").map_err(LocandaError::storage)?,
        expires_at: row.try_get("expires_at").map_err(LocandaError::storage)?,
        redeemed_by: row.try_get("redeemed_by").map_err(LocandaError::storage)?,
        redeemed_at: row.try_get("redeemed_at").map_err(LocandaError::storage)?,
    })
}
