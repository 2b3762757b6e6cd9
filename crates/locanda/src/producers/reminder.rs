// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reminder poller: publishes due reminders as bus events.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use locanda_core::{AgentEvent, EventBus, EventKind};
use locanda_storage::reminders;

const SCAN_INTERVAL: Duration = Duration::from_secs(60);

/// Spawns the per-minute scan. The first scan runs immediately to catch
/// anything that came due while the process was down.
pub fn spawn(pool: PgPool, bus: Arc<dyn EventBus>, cancel: CancellationToken) {
    tokio::spawn(async move {
        info!("reminder producer started");
        let mut ticker = tokio::time::interval(SCAN_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("reminder producer stopped");
                    return;
                }
                _ = ticker.tick() => fire_due(&pool, bus.as_ref()).await,
            }
        }
    });
}

/// Publishes an event for every due reminder, then stamps it fired.
///
/// A failed stamp is not retried within the tick; the reminder is
/// considered delivered once published, and the next scan simply does not
/// re-select stamped rows. At-least-once, not exactly-once.
async fn fire_due(pool: &PgPool, bus: &dyn EventBus) {
    let due = match reminders::due(pool).await {
        Ok(due) => due,
        Err(e) => {
            error!(error = %e, "reminder scan failed");
            return;
        }
    };

    for reminder in due {
        bus.publish(AgentEvent {
            kind: EventKind::Reminder,
            target_user_id: reminder.chat_id,
            chat_id: reminder.chat_id,
            content: reminder.message.clone(),
            source: "reminder".to_string(),
            event_id: Uuid::new_v4().to_string(),
        })
        .await;

        match reminders::mark_fired(pool, reminder.id).await {
            Ok(()) => info!(id = reminder.id, chat_id = reminder.chat_id, "reminder published"),
            Err(e) => error!(id = reminder.id, error = %e, "failed to stamp reminder"),
        }
    }
}
