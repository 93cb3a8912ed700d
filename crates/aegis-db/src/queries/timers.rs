use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, Row, params};

use aegis_types::models::TimerStatus;

use crate::models::TimerRow;
use crate::queries::OptionalExt;
use crate::{Database, StoreError, StoreResult, to_ts};

impl Database {
    /// Start a countdown. Any RUNNING session for the user is cancelled in
    /// the same transaction, so the partial unique index on
    /// `(user_id) WHERE status='RUNNING'` never trips under normal operation.
    pub fn start_timer(
        &self,
        id: &str,
        user_id: &str,
        duration_seconds: i64,
        latitude: f64,
        longitude: f64,
        now: DateTime<Utc>,
    ) -> StoreResult<TimerRow> {
        crate::queries::alerts::validate_coordinates(latitude, longitude)?;
        if duration_seconds <= 0 {
            return Err(StoreError::InvalidInput(
                "duration_seconds must be positive".into(),
            ));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "UPDATE timer_sessions SET status = 'CANCELLED', ended_at = ?1
                 WHERE user_id = ?2 AND status = 'RUNNING'",
                params![to_ts(now), user_id],
            )?;

            let expires_at = now + Duration::seconds(duration_seconds);
            tx.execute(
                "INSERT INTO timer_sessions
                 (id, user_id, duration_seconds, latitude, longitude, started_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    user_id,
                    duration_seconds,
                    latitude,
                    longitude,
                    to_ts(now),
                    to_ts(expires_at)
                ],
            )?;

            let row = get_timer(&tx, id)?.ok_or(StoreError::NotFound)?;
            tx.commit()?;
            Ok(row)
        })
    }

    pub fn running_timer(&self, user_id: &str) -> StoreResult<Option<TimerRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_TIMER} WHERE user_id = ?1 AND status = 'RUNNING'"
            ))?;
            let row = stmt.query_row([user_id], map_timer).optional()?;
            Ok(row)
        })
    }

    pub fn get_timer_by_id(&self, id: &str) -> StoreResult<Option<TimerRow>> {
        self.with_conn(|conn| get_timer(conn, id))
    }

    /// Check-in or explicit cancel: moves the RUNNING session to a terminal
    /// state. `NotFound` when the user has no RUNNING session.
    pub fn finish_timer(
        &self,
        user_id: &str,
        status: TimerStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<TimerRow> {
        debug_assert!(matches!(
            status,
            TimerStatus::CheckedIn | TimerStatus::Cancelled
        ));

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let id: Option<String> = tx
                .query_row(
                    "SELECT id FROM timer_sessions WHERE user_id = ?1 AND status = 'RUNNING'",
                    [user_id],
                    |row| row.get(0),
                )
                .optional()?;
            let id = id.ok_or(StoreError::NotFound)?;

            tx.execute(
                "UPDATE timer_sessions SET status = ?1, ended_at = ?2 WHERE id = ?3",
                params![status.as_str(), to_ts(now), id],
            )?;

            let row = get_timer(&tx, &id)?.ok_or(StoreError::NotFound)?;
            tx.commit()?;
            Ok(row)
        })
    }

    /// RUNNING sessions past their deadline at `now`.
    pub fn overdue_timers(&self, now: DateTime<Utc>) -> StoreResult<Vec<TimerRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_TIMER} WHERE status = 'RUNNING' AND expires_at <= ?1"
            ))?;
            let rows = stmt
                .query_map([to_ts(now)], map_timer)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Expire a RUNNING session and raise its escalation: mark EXPIRED,
    /// create the ACTIVE alert at the session's last known location, and
    /// fan it out, all in one transaction. A session is never left EXPIRED
    /// without its alert.
    ///
    /// Returns the number of attempts queued, or `None` when the session
    /// was checked in or cancelled between the overdue scan and this call.
    pub fn escalate_expired_timer(
        &self,
        session_id: &str,
        alert_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<usize>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let changed = tx.execute(
                "UPDATE timer_sessions SET status = 'EXPIRED', ended_at = ?1
                 WHERE id = ?2 AND status = 'RUNNING'",
                params![to_ts(now), session_id],
            )?;
            if changed == 0 {
                return Ok(None);
            }

            let session = get_timer(&tx, session_id)?.ok_or(StoreError::NotFound)?;
            crate::queries::alerts::insert_alert(
                &tx,
                alert_id,
                &session.user_id,
                session.latitude,
                session.longitude,
                now,
            )?;
            let queued = crate::queries::attempts::insert_fan_out(&tx, alert_id, &session.user_id, now)?;

            tx.commit()?;
            Ok(Some(queued))
        })
    }
}

const SELECT_TIMER: &str =
    "SELECT id, user_id, duration_seconds, latitude, longitude, status, started_at,
            expires_at, ended_at
     FROM timer_sessions";

fn get_timer(conn: &Connection, id: &str) -> StoreResult<Option<TimerRow>> {
    let mut stmt = conn.prepare(&format!("{SELECT_TIMER} WHERE id = ?1"))?;
    let row = stmt.query_row([id], map_timer).optional()?;
    Ok(row)
}

fn map_timer(row: &Row<'_>) -> Result<TimerRow, rusqlite::Error> {
    Ok(TimerRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        duration_seconds: row.get(2)?,
        latitude: row.get(3)?,
        longitude: row.get(4)?,
        status: row.get(5)?,
        started_at: row.get(6)?,
        expires_at: row.get(7)?,
        ended_at: row.get(8)?,
    })
}
