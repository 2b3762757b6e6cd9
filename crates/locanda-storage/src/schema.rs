// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Schema bootstrap and live-schema introspection.

use sqlx::{PgPool, Row};
use std::fmt::Write as _;

use locanda_core::LocandaError;

/// Creates every runtime and domain table. Must run on the admin pool.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), LocandaError> {
    let statements = [
        // User registry: maps an external user to a Postgres role.
        r#"CREATE TABLE IF NOT EXISTS users (
            telegram_id  BIGINT PRIMARY KEY,
            db_role      TEXT NOT NULL UNIQUE,
            role         TEXT NOT NULL DEFAULT 'cleaner',
            name         TEXT,
            created_at   TIMESTAMPTZ NOT NULL DEFAULT now()
        )"#,
        // Helper for CURRENT_USER-based row policies.
        r#"CREATE OR REPLACE FUNCTION current_telegram_id() RETURNS bigint AS $$
            SELECT telegram_id FROM users WHERE db_role = current_user;
        $$ LANGUAGE sql STABLE SECURITY DEFINER"#,
        // Credentials stay server-side; never exported outside the process.
        r#"CREATE TABLE IF NOT EXISTS user_credentials (
            telegram_id  BIGINT PRIMARY KEY REFERENCES users(telegram_id),
            db_password  TEXT NOT NULL
        )"#,
        r#"CREATE TABLE IF NOT EXISTS invites (
            token        TEXT PRIMARY KEY,
            role         TEXT NOT NULL,
            name         TEXT NOT NULL,
            issued_by    BIGINT NOT NULL,
            issued_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
            expires_at   TIMESTAMPTZ NOT NULL,
            redeemed_by  BIGINT,
            redeemed_at  TIMESTAMPTZ
        )"#,
        r#"CREATE TABLE IF NOT EXISTS reminders (
            id          BIGSERIAL PRIMARY KEY,
            fire_at     TIMESTAMPTZ NOT NULL,
            chat_id     BIGINT NOT NULL,
            message     TEXT NOT NULL,
            room_id     BIGINT,
            created_by  BIGINT NOT NULL,
            fired_at    TIMESTAMPTZ,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
        )"#,
        r#"CREATE INDEX IF NOT EXISTS reminders_due_idx
            ON reminders (fire_at) WHERE fired_at IS NULL"#,
        r#"CREATE TABLE IF NOT EXISTS agent_events (
            id               BIGSERIAL PRIMARY KEY,
            event_id         TEXT NOT NULL UNIQUE,
            target_user_id   BIGINT NOT NULL,
            chat_id          BIGINT NOT NULL,
            kind             TEXT NOT NULL,
            content          TEXT NOT NULL,
            source           TEXT,
            context_snapshot JSONB,
            created_at       TIMESTAMPTZ NOT NULL DEFAULT now(),
            processed_at     TIMESTAMPTZ
        )"#,
        // Domain tables, so a fresh database is immediately usable.
        r#"CREATE TABLE IF NOT EXISTS rooms (
            id           SERIAL PRIMARY KEY,
            name         TEXT NOT NULL UNIQUE,
            floor        INT NOT NULL DEFAULT 1,
            status       TEXT NOT NULL DEFAULT 'available',
            guest_name   TEXT,
            checkin_at   TIMESTAMPTZ,
            checkout_at  TIMESTAMPTZ,
            notes        TEXT
        )"#,
        r#"CREATE TABLE IF NOT EXISTS reservations (
            id           BIGSERIAL PRIMARY KEY,
            room_id      INT NOT NULL REFERENCES rooms(id),
            guest_name   TEXT NOT NULL,
            checkin_at   TIMESTAMPTZ NOT NULL,
            checkout_at  TIMESTAMPTZ NOT NULL,
            notes        TEXT,
            created_by   BIGINT,
            created_at   TIMESTAMPTZ NOT NULL DEFAULT now()
        )"#,
        r#"CREATE TABLE IF NOT EXISTS assignments (
            id          BIGSERIAL PRIMARY KEY,
            room_id     INT NOT NULL REFERENCES rooms(id),
            cleaner_id  BIGINT REFERENCES users(telegram_id),
            type        TEXT NOT NULL,
            date        DATE NOT NULL,
            shift       TEXT NOT NULL DEFAULT 'morning',
            status      TEXT NOT NULL DEFAULT 'pending',
            notes       TEXT,
            updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
        )"#,
    ];

    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(LocandaError::storage)?;
    }
    Ok(())
}

/// Walks information_schema and returns a compact human-readable dump of
/// tables, columns, types and foreign keys.
///
/// The credentials table and the `db_role` and `role` columns of `users`
/// are implementation detail and are hidden from the dump.
pub async fn dump_schema(pool: &PgPool) -> Result<String, LocandaError> {
    let column_rows = sqlx::query(
        r#"SELECT table_name, column_name, data_type, column_default, is_nullable
           FROM information_schema.columns
           WHERE table_schema = 'public'
             AND table_name NOT IN ('user_credentials')
             AND NOT (table_name = 'users' AND column_name IN ('db_role', 'role'))
           ORDER BY table_name, ordinal_position"#,
    )
    .fetch_all(pool)
    .await
    .map_err(LocandaError::storage)?;

    struct ColumnInfo {
        name: String,
        data_type: String,
        default: Option<String>,
        nullable: bool,
    }

    let mut table_order: Vec<String> = Vec::new();
    let mut tables: std::collections::HashMap<String, Vec<ColumnInfo>> =
        std::collections::HashMap::new();

    for row in column_rows {
        let table: String = row.try_get("table_name").map_err(LocandaError::storage)?;
        let column = ColumnInfo {
            name: row.try_get("column_name").map_err(LocandaError::storage)?,
            data_type: row.try_get("data_type").map_err(LocandaError::storage)?,
            default: row
                .try_get("column_default")
                .map_err(LocandaError::storage)?,
            nullable: row
                .try_get::<String, _>("is_nullable")
                .map_err(LocandaError::storage)?
                == "YES",
        };
        if !tables.contains_key(&table) {
            table_order.push(table.clone());
        }
        tables.entry(table).or_default().push(column);
    }

    let fk_rows = sqlx::query(
        r#"SELECT
               kcu.table_name, kcu.column_name,
               ccu.table_name AS ref_table, ccu.column_name AS ref_column
           FROM information_schema.table_constraints tc
           JOIN information_schema.key_column_usage kcu
               ON tc.constraint_name = kcu.constraint_name
              AND tc.table_schema = kcu.table_schema
           JOIN information_schema.constraint_column_usage ccu
               ON tc.constraint_name = ccu.constraint_name
              AND tc.table_schema = ccu.table_schema
           WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = 'public'
             AND kcu.table_name NOT IN ('user_credentials')
           ORDER BY kcu.table_name, kcu.column_name"#,
    )
    .fetch_all(pool)
    .await
    .map_err(LocandaError::storage)?;

    let mut fks: std::collections::HashMap<String, Vec<(String, String, String)>> =
        std::collections::HashMap::new();
    for row in fk_rows {
        let table: String = row.try_get("table_name").map_err(LocandaError::storage)?;
        let entry = (
            row.try_get("column_name").map_err(LocandaError::storage)?,
            row.try_get("ref_table").map_err(LocandaError::storage)?,
            row.try_get("ref_column").map_err(LocandaError::storage)?,
        );
        fks.entry(table).or_default().push(entry);
    }

    let mut out = String::new();
    for table in &table_order {
        let _ = writeln!(out, "## {table}");
        if let Some(columns) = tables.get(table) {
            for c in columns {
                let null = if c.nullable { " NULL" } else { "" };
                let default = c
                    .default
                    .as_deref()
                    .map(|d| format!(" DEFAULT {d}"))
                    .unwrap_or_default();
                let _ = writeln!(out, "  {:<20} {}{}{}", c.name, c.data_type, null, default);
            }
        }
        if let Some(refs) = fks.get(table) {
            for (column, ref_table, ref_column) in refs {
                let _ = writeln!(out, "  FK: {column} -> {ref_table}({ref_column})");
            }
        }
        out.push('\n');
    }
    Ok(out)
}
