// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reminder rows: scheduling and the due-row scan used by the producer.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use locanda_core::LocandaError;

/// A reminder ready to fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueReminder {
    pub id: i64,
    pub chat_id: i64,
    pub message: String,
}

/// A reminder to schedule.
#[derive(Debug, Clone)]
pub struct NewReminder {
    pub fire_at: DateTime<Utc>,
    pub chat_id: i64,
    pub message: String,
    pub room_id: Option<i64>,
    pub created_by: i64,
}

/// Inserts a reminder row and returns its id.
pub async fn schedule(pool: &PgPool, reminder: &NewReminder) -> Result<i64, LocandaError> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO reminders (fire_at, chat_id, message, room_id, created_by)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id",
    )
    .bind(reminder.fire_at)
    .bind(reminder.chat_id)
    .bind(&reminder.message)
    .bind(reminder.room_id)
    .bind(reminder.created_by)
    .fetch_one(pool)
    .await
    .map_err(LocandaError::storage)
}

/// All reminders whose fire time has passed and that have not fired yet,
/// oldest first.
pub async fn due(pool: &PgPool) -> Result<Vec<DueReminder>, LocandaError> {
    let rows = sqlx::query(
        "SELECT id, chat_id, message FROM reminders
         WHERE fire_at <= now() AND fired_at IS NULL
         ORDER BY fire_at",
    )
    .fetch_all(pool)
    .await
    .map_err(LocandaError::storage)?;

    rows.into_iter()
        .map(|row| {
            Ok(DueReminder {
                id: row.try_get("id").map_err(LocandaError::storage)?,
                chat_id: row.try_get("chat_id").map_err(LocandaError::storage)?,
                message: row.try_get("message").map_err(LocandaError::storage)?,
            })
        })
        .collect()
}

/// Stamps a reminder as fired so the next scan does not re-select it.
pub async fn mark_fired(pool: &PgPool, id: i64) -> Result<(), LocandaError> {
    sqlx::query("UPDATE reminders SET fired_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(LocandaError::storage)?;
    Ok(())
}
