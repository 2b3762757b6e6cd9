// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user database principals.
//!
//! Every external user maps one-to-one to a Postgres LOGIN role. Queries on
//! behalf of a user run through a pool authenticated as that role, so RLS
//! and CURRENT_USER-based policies apply at the storage layer. The admin
//! pool is used only for DDL and registry bookkeeping.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::Utc;
use rand::RngCore;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Row};
use strum::{Display, EnumString};
use tokio::sync::Mutex;
use tracing::{info, warn};

use locanda_core::LocandaError;

use crate::invites::{invite_from_row, Invite, INVITE_TTL_DAYS};

/// Connection cap for each per-user pool.
const USER_POOL_MAX_CONNECTIONS: u32 = 3;

/// Staff role attached to a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum StaffRole {
    Manager,
    Cleaner,
}

/// Manages per-user Postgres roles, credentials and connection pools.
pub struct PrincipalRegistry {
    admin: PgPool,
    database_url: String,
    pools: Mutex<HashMap<i64, PgPool>>,
}

impl PrincipalRegistry {
    pub fn new(admin: PgPool, database_url: impl Into<String>) -> Self {
        Self {
            admin,
            database_url: database_url.into(),
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the user has a row in the registry.
    pub async fn is_registered(&self, user_id: i64) -> Result<bool, LocandaError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE telegram_id = $1)",
        )
        .bind(user_id)
        .fetch_one(&self.admin)
        .await
        .map_err(LocandaError::storage)
    }

    /// Looks up the display name and role for a registered user.
    pub async fn profile(&self, user_id: i64) -> Result<Option<(String, StaffRole)>, LocandaError> {
        let row = sqlx::query(
            "SELECT COALESCE(name, ''), role FROM users WHERE telegram_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.admin)
        .await
        .map_err(LocandaError::storage)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let name: String = row.try_get(0).map_err(LocandaError::storage)?;
        let role: String = row.try_get(1).map_err(LocandaError::storage)?;
        let role = StaffRole::from_str(&role)
            .map_err(|_| LocandaError::Internal(format!("unknown staff role in users: {role}")))?;
        Ok(Some((name, role)))
    }

    /// Creates or updates the principal for a user: fresh random credential,
    /// LOGIN role, the base grant set, and the registry rows. A repeated
    /// register rotates the credential without duplicating the principal.
    pub async fn register(
        &self,
        user_id: i64,
        role: StaffRole,
        name: &str,
    ) -> Result<(), LocandaError> {
        let db_role = role_name(user_id);
        let password = random_credential();

        // LOGIN role; rotate the password when the role already exists.
        let create_role = format!(
            "DO $$ BEGIN \
                CREATE ROLE {db_role} LOGIN PASSWORD '{password}'; \
            EXCEPTION WHEN duplicate_object THEN \
                ALTER ROLE {db_role} LOGIN PASSWORD '{password}'; \
            END $$"
        );
        sqlx::query(&create_role)
            .execute(&self.admin)
            .await
            .map_err(LocandaError::storage)?;

        self.apply_grants(&db_role).await;

        sqlx::query(
            "INSERT INTO users (telegram_id, db_role, role, name) VALUES ($1, $2, $3, $4)
             ON CONFLICT (telegram_id) DO UPDATE SET db_role = $2, role = $3, name = $4",
        )
        .bind(user_id)
        .bind(&db_role)
        .bind(role.to_string())
        .bind(name)
        .execute(&self.admin)
        .await
        .map_err(LocandaError::storage)?;

        sqlx::query(
            "INSERT INTO user_credentials (telegram_id, db_password) VALUES ($1, $2)
             ON CONFLICT (telegram_id) DO UPDATE SET db_password = $2",
        )
        .bind(user_id)
        .bind(&password)
        .execute(&self.admin)
        .await
        .map_err(LocandaError::storage)?;

        // The cached pool holds the previous credential.
        self.pools.lock().await.remove(&user_id);

        info!(user_id, db_role = db_role.as_str(), role = %role, "registered principal");
        Ok(())
    }

    /// Returns the connection pool for a registered user, opening it on
    /// first use with the stored credential and validating with a ping.
    pub async fn pool(&self, user_id: i64) -> Result<PgPool, LocandaError> {
        {
            let pools = self.pools.lock().await;
            if let Some(pool) = pools.get(&user_id) {
                return Ok(pool.clone());
            }
        }

        let row = sqlx::query(
            "SELECT u.db_role, c.db_password
             FROM users u JOIN user_credentials c ON c.telegram_id = u.telegram_id
             WHERE u.telegram_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.admin)
        .await
        .map_err(LocandaError::storage)?;

        let Some(row) = row else {
            return Err(LocandaError::Internal(format!(
                "user {user_id} is not registered"
            )));
        };
        let db_role: String = row.try_get(0).map_err(LocandaError::storage)?;
        let password: String = row.try_get(1).map_err(LocandaError::storage)?;

        let pool = self.open_user_pool(&db_role, &password).await?;

        let mut pools = self.pools.lock().await;
        Ok(pools.entry(user_id).or_insert(pool).clone())
    }

    /// Validates an unused, unexpired invite, marks it redeemed, and
    /// registers the redeeming user with the invite's role and name.
    pub async fn use_invite(
        &self,
        token: &str,
        redeeming_user_id: i64,
    ) -> Result<Invite, LocandaError> {
        let mut tx = self.admin.begin().await.map_err(LocandaError::storage)?;

        let row = sqlx::query(
            "SELECT token, role, name, issued_by, issued_at, expires_at, redeemed_by, redeemed_at
             FROM invites
             WHERE token = $1 AND redeemed_by IS NULL AND expires_at > now()
             FOR UPDATE",
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await
        .map_err(LocandaError::storage)?;

        let Some(row) = row else {
            return Err(LocandaError::InviteInvalid);
        };
        let mut invite = invite_from_row(&row)?;

        let now = Utc::now();
        sqlx::query("UPDATE invites SET redeemed_by = $1, redeemed_at = $2 WHERE token = $3")
            .bind(redeeming_user_id)
            .bind(now)
            .bind(token)
            .execute(&mut *tx)
            .await
            .map_err(LocandaError::storage)?;

        tx.commit().await.map_err(LocandaError::storage)?;

        self.register(redeeming_user_id, invite.role, &invite.name)
            .await?;

        invite.redeemed_by = Some(redeeming_user_id);
        invite.redeemed_at = Some(now);
        Ok(invite)
    }

    /// Creates a one-time invite and returns its token.
    pub async fn create_invite(
        &self,
        issued_by: i64,
        role: StaffRole,
        name: &str,
    ) -> Result<String, LocandaError> {
        let token = random_credential();
        let expires_at = Utc::now() + chrono::Duration::days(INVITE_TTL_DAYS);

        sqlx::query(
            "INSERT INTO invites (token, role, name, issued_by, expires_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&token)
        .bind(role.to_string())
        .bind(name)
        .bind(issued_by)
        .bind(expires_at)
        .execute(&self.admin)
        .await
        .map_err(LocandaError::storage)?;

        Ok(token)
    }

    /// Re-applies the full grant set to every principal matching the role
    /// derivation pattern. Guards against principals that predate the
    /// current table schema. Returns the number of repaired roles.
    pub async fn repair_grants(&self) -> Result<u32, LocandaError> {
        let roles: Vec<String> =
            sqlx::query_scalar("SELECT rolname FROM pg_roles WHERE rolname LIKE 'tg\\_%'")
                .fetch_all(&self.admin)
                .await
                .map_err(LocandaError::storage)?;

        let count = roles.len() as u32;
        for db_role in roles {
            self.apply_grants(&db_role).await;
        }
        if count > 0 {
            info!(count, "grant repair completed");
        }
        Ok(count)
    }

    /// Applies the base grant set. Individual failures are logged, not
    /// fatal: a partially granted principal is repaired at the next startup.
    async fn apply_grants(&self, db_role: &str) {
        for grant in base_grants(db_role) {
            if let Err(e) = sqlx::query(&grant).execute(&self.admin).await {
                warn!(db_role, error = %e, grant = grant.as_str(), "grant failed");
            }
        }
    }

    async fn open_user_pool(&self, db_role: &str, password: &str) -> Result<PgPool, LocandaError> {
        let options = PgConnectOptions::from_str(&self.database_url)
            .map_err(LocandaError::storage)?
            .username(db_role)
            .password(password);

        let pool = PgPoolOptions::new()
            .max_connections(USER_POOL_MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(LocandaError::storage)?;

        // Validate the credential before caching the pool.
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(LocandaError::storage)?;

        Ok(pool)
    }
}

/// Deterministic role name for an external user id.
pub fn role_name(user_id: i64) -> String {
    format!("tg_{user_id}")
}

/// The base grant set issued at registration and re-applied by grant repair.
///
/// Invites are deliberately absent: issuance and redemption run on the
/// admin pool only, and an unredeemed token readable through execute_sql
/// would let anyone self-register with the invite's role.
pub fn base_grants(db_role: &str) -> Vec<String> {
    vec![
        format!("GRANT CONNECT ON DATABASE locanda TO {db_role}"),
        format!("GRANT USAGE ON SCHEMA public TO {db_role}"),
        format!("GRANT SELECT, INSERT, UPDATE, DELETE ON rooms TO {db_role}"),
        format!("GRANT SELECT, INSERT, UPDATE, DELETE ON reservations TO {db_role}"),
        format!("GRANT SELECT, INSERT, UPDATE, DELETE ON assignments TO {db_role}"),
        format!("GRANT SELECT, INSERT, UPDATE, DELETE ON reminders TO {db_role}"),
        format!("GRANT SELECT ON users TO {db_role}"),
        format!("GRANT USAGE, SELECT ON ALL SEQUENCES IN SCHEMA public TO {db_role}"),
    ]
}

/// 16 random bytes, hex-encoded: used for credentials and invite tokens.
pub(crate) fn random_credential() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
