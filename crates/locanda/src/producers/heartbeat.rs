// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Heartbeat producer: periodic check-in instructions for a manager.
//!
//! Two mutually exclusive modes. A daily "HH:MM" time in the configured
//! IANA zone takes precedence; otherwise the producer fires every N
//! minutes (0 disables it).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use locanda_core::{AgentEvent, EventBus, EventKind};

const HEARTBEAT_CONTENT: &str = "🕐 Heartbeat check. Check the database for upcoming \
    checkouts, check-ins, stale assignments, and any issues in the next 24 hours. Use \
    execute_sql to investigate. If you find issues, use send_user_message to notify me \
    with a summary. If everything looks fine, just reply OK.";

/// Resolved heartbeat schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatSchedule {
    Disabled,
    Interval(Duration),
    Daily { hour: u32, minute: u32, tz: Tz },
}

/// Parses the configuration into a schedule. Invalid values disable the
/// producer with a log instead of failing startup.
pub fn schedule_from_config(
    heartbeat_time: Option<&str>,
    interval_minutes: u64,
    timezone: &str,
) -> HeartbeatSchedule {
    if let Some(time) = heartbeat_time {
        let Some((hour, minute)) = parse_hh_mm(time) else {
            warn!(heartbeat_time = time, "invalid heartbeat_time (expected HH:MM), disabling");
            return HeartbeatSchedule::Disabled;
        };
        let tz = match timezone.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                warn!(timezone, "unknown timezone, falling back to Europe/Rome");
                Tz::Europe__Rome
            }
        };
        return HeartbeatSchedule::Daily { hour, minute, tz };
    }

    if interval_minutes == 0 {
        return HeartbeatSchedule::Disabled;
    }
    HeartbeatSchedule::Interval(Duration::from_secs(interval_minutes * 60))
}

fn parse_hh_mm(value: &str) -> Option<(u32, u32)> {
    let (hour, minute) = value.split_once(':')?;
    let hour: u32 = hour.trim().parse().ok()?;
    let minute: u32 = minute.trim().parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some((hour, minute))
}

/// Next wall-clock occurrence of `hour:minute` in `tz`, strictly after
/// `now`. DST gaps skip to the next valid day; ambiguous times take the
/// earlier instant.
pub fn next_daily_occurrence(now: DateTime<Utc>, hour: u32, minute: u32, tz: Tz) -> DateTime<Utc> {
    let local_now = now.with_timezone(&tz);
    let mut date = local_now.date_naive();
    loop {
        if let Some(naive) = date.and_hms_opt(hour, minute, 0) {
            if let Some(candidate) = tz.from_local_datetime(&naive).earliest() {
                if candidate > local_now {
                    return candidate.with_timezone(&Utc);
                }
            }
        }
        date = date.succ_opt().unwrap_or(date);
    }
}

/// Spawns the producer. The target is the configured bootstrap manager,
/// else the earliest-registered manager; with neither the producer idles.
pub fn spawn(
    schedule: HeartbeatSchedule,
    pool: PgPool,
    bootstrap_manager_id: Option<i64>,
    bus: Arc<dyn EventBus>,
    cancel: CancellationToken,
) {
    if schedule == HeartbeatSchedule::Disabled {
        info!("heartbeat disabled");
        return;
    }

    tokio::spawn(async move {
        let Some(manager_id) = resolve_manager(&pool, bootstrap_manager_id).await else {
            warn!("heartbeat has no manager to target, idling");
            return;
        };

        match schedule {
            HeartbeatSchedule::Disabled => {}
            HeartbeatSchedule::Interval(interval) => {
                info!(interval_secs = interval.as_secs(), manager_id, "heartbeat: interval mode");
                let mut ticker = tokio::time::interval(interval);
                // The immediate first tick would fire at startup.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!("heartbeat stopped");
                            return;
                        }
                        _ = ticker.tick() => publish(bus.as_ref(), manager_id).await,
                    }
                }
            }
            HeartbeatSchedule::Daily { hour, minute, tz } => {
                info!(hour, minute, %tz, manager_id, "heartbeat: daily mode");
                loop {
                    let next = next_daily_occurrence(Utc::now(), hour, minute, tz);
                    let delay = (next - Utc::now())
                        .to_std()
                        .unwrap_or(Duration::from_secs(1));
                    info!(delay_secs = delay.as_secs(), next = %next, "heartbeat: next run");
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!("heartbeat stopped");
                            return;
                        }
                        _ = tokio::time::sleep(delay) => publish(bus.as_ref(), manager_id).await,
                    }
                }
            }
        }
    });
}

async fn publish(bus: &dyn EventBus, manager_id: i64) {
    bus.publish(AgentEvent {
        kind: EventKind::Heartbeat,
        target_user_id: manager_id,
        chat_id: manager_id,
        content: HEARTBEAT_CONTENT.to_string(),
        source: "system".to_string(),
        event_id: Uuid::new_v4().to_string(),
    })
    .await;
    info!(manager_id, "heartbeat event published");
}

async fn resolve_manager(pool: &PgPool, bootstrap: Option<i64>) -> Option<i64> {
    if bootstrap.is_some() {
        return bootstrap;
    }
    match sqlx::query_scalar::<_, i64>(
        "SELECT telegram_id FROM users WHERE role = 'manager' ORDER BY created_at LIMIT 1",
    )
    .fetch_optional(pool)
    .await
    {
        Ok(manager) => manager,
        Err(e) => {
            error!(error = %e, "manager lookup for heartbeat failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    #[test]
    fn daily_time_takes_precedence_over_interval() {
        let schedule = schedule_from_config(Some("17:00"), 60, "Europe/Rome");
        assert_eq!(
            schedule,
            HeartbeatSchedule::Daily {
                hour: 17,
                minute: 0,
                tz: Tz::Europe__Rome
            }
        );
    }

    #[test]
    fn interval_mode_is_the_fallback() {
        assert_eq!(
            schedule_from_config(None, 45, "Europe/Rome"),
            HeartbeatSchedule::Interval(Duration::from_secs(45 * 60))
        );
    }

    #[test]
    fn zero_interval_disables() {
        assert_eq!(
            schedule_from_config(None, 0, "Europe/Rome"),
            HeartbeatSchedule::Disabled
        );
    }

    #[test]
    fn invalid_time_disables() {
        assert_eq!(
            schedule_from_config(Some("25:00"), 60, "Europe/Rome"),
            HeartbeatSchedule::Disabled
        );
        assert_eq!(
            schedule_from_config(Some("late"), 60, "Europe/Rome"),
            HeartbeatSchedule::Disabled
        );
    }

    #[test]
    fn parses_hh_mm() {
        assert_eq!(parse_hh_mm("17:00"), Some((17, 0)));
        assert_eq!(parse_hh_mm("9:5"), Some((9, 5)));
        assert_eq!(parse_hh_mm("17"), None);
        assert_eq!(parse_hh_mm("17:60"), None);
    }

    #[test]
    fn next_occurrence_is_later_today_when_time_has_not_passed() {
        let tz = Tz::Europe__Rome;
        // 2026-06-10 08:00 Rome (UTC+2 in summer).
        let now = tz.with_ymd_and_hms(2026, 6, 10, 8, 0, 0).unwrap().with_timezone(&Utc);
        let next = next_daily_occurrence(now, 17, 0, tz);
        let local = next.with_timezone(&tz);
        assert_eq!(local.format("%Y-%m-%d %H:%M").to_string(), "2026-06-10 17:00");
    }

    #[test]
    fn next_occurrence_rolls_to_tomorrow_when_passed() {
        let tz = Tz::Europe__Rome;
        let now = tz.with_ymd_and_hms(2026, 6, 10, 18, 30, 0).unwrap().with_timezone(&Utc);
        let next = next_daily_occurrence(now, 17, 0, tz);
        let local = next.with_timezone(&tz);
        assert_eq!(local.format("%Y-%m-%d %H:%M").to_string(), "2026-06-11 17:00");
    }

    #[test]
    fn next_occurrence_is_strictly_in_the_future() {
        let tz = Tz::Europe__Rome;
        let now = tz.with_ymd_and_hms(2026, 6, 10, 17, 0, 0).unwrap().with_timezone(&Utc);
        let next = next_daily_occurrence(now, 17, 0, tz);
        assert!(next > now);
    }
}
