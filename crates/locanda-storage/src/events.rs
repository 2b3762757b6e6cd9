// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable envelope around the in-memory event bus.
//!
//! Every published event is persisted first (idempotently on `event_id`)
//! and then forwarded to the in-memory bus. On startup,
//! [`replay_unprocessed`](PersistentEventBus::replay_unprocessed) re-emits
//! everything that was delivered but never marked processed before the last
//! crash. Delivery is therefore at-least-once; handlers own any stronger
//! guarantee for their side effects.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{error, info, warn};

use locanda_core::{AgentEvent, EventBus, EventKind, InMemoryBus, LocandaError};

/// Event bus persisted to the `agent_events` table.
pub struct PersistentEventBus {
    mem: InMemoryBus,
    pool: PgPool,
}

impl PersistentEventBus {
    pub fn new(pool: PgPool) -> Self {
        Self {
            mem: InMemoryBus::new(),
            pool,
        }
    }

    /// Re-publishes every persisted event with no `processed_at`, in
    /// creation order, directly onto the in-memory sink. Call once on
    /// startup, before the dispatcher subscribes. Returns the replay count.
    pub async fn replay_unprocessed(&self) -> Result<u64, LocandaError> {
        let rows = sqlx::query(
            "SELECT event_id, target_user_id, chat_id, kind, content, COALESCE(source, '') AS source
             FROM agent_events
             WHERE processed_at IS NULL
             ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(LocandaError::storage)?;

        let mut count = 0u64;
        for row in rows {
            let kind: String = row.try_get("kind").map_err(LocandaError::storage)?;
            let Ok(kind) = EventKind::from_str(&kind) else {
                warn!(kind = kind.as_str(), "skipping persisted event of unknown kind");
                continue;
            };
            let event = AgentEvent {
                kind,
                target_user_id: row
                    .try_get("target_user_id")
                    .map_err(LocandaError::storage)?,
                chat_id: row.try_get("chat_id").map_err(LocandaError::storage)?,
                content: row.try_get("content").map_err(LocandaError::storage)?,
                source: row.try_get("source").map_err(LocandaError::storage)?,
                event_id: row.try_get("event_id").map_err(LocandaError::storage)?,
            };
            self.mem.publish(event).await;
            count += 1;
        }

        if count > 0 {
            info!(count, "replayed unprocessed events");
        }
        Ok(count)
    }
}

#[async_trait]
impl EventBus for PersistentEventBus {
    /// Persists then forwards. A persistence failure is logged but does not
    /// block the in-memory delivery: durability is sacrificed for that one
    /// event, crash-replay covers the rest.
    async fn publish(&self, event: AgentEvent) {
        let inserted = sqlx::query(
            "INSERT INTO agent_events (event_id, target_user_id, chat_id, kind, content, source)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(&event.event_id)
        .bind(event.target_user_id)
        .bind(event.chat_id)
        .bind(event.kind.to_string())
        .bind(&event.content)
        .bind(&event.source)
        .execute(&self.pool)
        .await;

        if let Err(e) = inserted {
            error!(
                error = %e,
                event_id = event.event_id.as_str(),
                "failed to persist event"
            );
        }

        self.mem.publish(event).await;
    }

    async fn recv(&self) -> Option<AgentEvent> {
        self.mem.recv().await
    }

    fn close(&self) {
        self.mem.close();
    }

    /// Sets `processed_at` exactly once; repeated calls keep the first
    /// timestamp.
    async fn mark_processed(&self, event_id: &str) -> Result<(), LocandaError> {
        sqlx::query(
            "UPDATE agent_events SET processed_at = now()
             WHERE event_id = $1 AND processed_at IS NULL",
        )
        .bind(event_id)
        .execute(&self.pool)
        .await
        .map_err(LocandaError::storage)?;
        Ok(())
    }
}
