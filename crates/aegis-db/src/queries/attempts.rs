use chrono::{DateTime, Utc};
use rusqlite::{Row, params};
use uuid::Uuid;

use aegis_types::models::{AttemptStatus, Channel};

use crate::models::{AttemptRow, ContactRow};
use crate::{Database, StoreResult, to_ts};

/// Channels used for one contact: SMS always, EMAIL when the contact has an
/// address on file. Push is reserved until device tokens are collected.
pub fn channels_for(contact: &ContactRow) -> Vec<Channel> {
    let mut channels = vec![Channel::Sms];
    if contact.email.is_some() {
        channels.push(Channel::Email);
    }
    channels
}

impl Database {
    /// Snapshot the roster into PENDING attempt rows, one per contact per
    /// channel, all due immediately. Roster read and inserts share one
    /// transaction; contact name/phone/email are copied so the audit trail
    /// survives later roster edits.
    pub fn fan_out(&self, alert_id: &str, user_id: &str, now: DateTime<Utc>) -> StoreResult<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let created = insert_fan_out(&tx, alert_id, user_id, now)?;
            tx.commit()?;
            Ok(created)
        })
    }

    /// Alerts that have at least one PENDING attempt due at `now`.
    pub fn due_alert_ids(&self, now: DateTime<Utc>) -> StoreResult<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT alert_id FROM notification_attempts
                 WHERE status = 'PENDING' AND next_attempt_at <= ?1",
            )?;
            let ids = stmt
                .query_map([to_ts(now)], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Due attempts for one alert in notification order: roster priority
    /// ascending, then fan-out insertion order.
    pub fn due_attempts_for_alert(
        &self,
        alert_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<AttemptRow>> {
        self.with_conn(|conn| {
            let mut stmt = stmt_for(
                conn,
                "WHERE alert_id = ?1 AND status = 'PENDING' AND next_attempt_at <= ?2
                 ORDER BY seq ASC",
            )?;
            let rows = stmt
                .query_map(params![alert_id, to_ts(now)], map_attempt)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn attempts_for_alert(&self, alert_id: &str) -> StoreResult<Vec<AttemptRow>> {
        self.with_conn(|conn| {
            let mut stmt = stmt_for(conn, "WHERE alert_id = ?1 ORDER BY seq ASC")?;
            let rows = stmt
                .query_map([alert_id], map_attempt)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn mark_attempt_sent(
        &self,
        id: &str,
        delivered: bool,
        attempt_count: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let status = if delivered {
            AttemptStatus::Delivered
        } else {
            AttemptStatus::Sent
        };
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE notification_attempts
                 SET status = ?1, attempt_count = ?2, last_attempt_at = ?3, failure_reason = NULL
                 WHERE id = ?4",
                params![status.as_str(), attempt_count, to_ts(now), id],
            )?;
            Ok(())
        })
    }

    /// Record a failed try and requeue for the given instant. Status stays
    /// PENDING; the attempt becomes due again at `next_attempt_at`.
    pub fn mark_attempt_retry(
        &self,
        id: &str,
        attempt_count: i64,
        reason: &str,
        now: DateTime<Utc>,
        next_attempt_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE notification_attempts
                 SET attempt_count = ?1, last_attempt_at = ?2, next_attempt_at = ?3,
                     failure_reason = ?4
                 WHERE id = ?5",
                params![attempt_count, to_ts(now), to_ts(next_attempt_at), reason, id],
            )?;
            Ok(())
        })
    }

    /// Terminal failure: the retry budget is spent, never retried again.
    pub fn mark_attempt_failed(
        &self,
        id: &str,
        attempt_count: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE notification_attempts
                 SET status = 'FAILED', attempt_count = ?1, last_attempt_at = ?2,
                     failure_reason = ?3
                 WHERE id = ?4",
                params![attempt_count, to_ts(now), reason, id],
            )?;
            Ok(())
        })
    }

    /// Fatal gateway misconfiguration aborts the whole batch for an alert.
    pub fn fail_all_pending(
        &self,
        alert_id: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE notification_attempts
                 SET status = 'FAILED', last_attempt_at = ?1, failure_reason = ?2
                 WHERE alert_id = ?3 AND status = 'PENDING'",
                params![to_ts(now), reason, alert_id],
            )?;
            Ok(changed)
        })
    }
}

pub(crate) fn insert_fan_out(
    conn: &rusqlite::Connection,
    alert_id: &str,
    user_id: &str,
    now: DateTime<Utc>,
) -> StoreResult<usize> {
    let contacts: Vec<ContactRow> = {
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, phone, email, priority, is_active, created_at
             FROM trusted_contacts
             WHERE user_id = ?1 AND is_active = 1
             ORDER BY priority ASC, created_at ASC",
        )?;
        stmt.query_map([user_id], |row| {
            Ok(ContactRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                name: row.get(2)?,
                phone: row.get(3)?,
                email: row.get(4)?,
                priority: row.get(5)?,
                is_active: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?
    };

    // `seq` freezes the roster order at fan-out time; the worker replays
    // attempts in exactly this order.
    let mut created = 0usize;
    for contact in &contacts {
        for channel in channels_for(contact) {
            conn.execute(
                "INSERT INTO notification_attempts
                 (id, alert_id, contact_id, contact_name, contact_phone, contact_email,
                  channel, priority, seq, next_attempt_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    Uuid::new_v4().to_string(),
                    alert_id,
                    contact.id,
                    contact.name,
                    contact.phone,
                    contact.email,
                    channel.as_str(),
                    contact.priority,
                    created as i64,
                    to_ts(now),
                    to_ts(now),
                ],
            )?;
            created += 1;
        }
    }

    Ok(created)
}

const SELECT_ATTEMPT: &str =
    "SELECT id, alert_id, contact_id, contact_name, contact_phone, contact_email,
            channel, status, attempt_count, priority, seq, last_attempt_at,
            next_attempt_at, failure_reason, created_at
     FROM notification_attempts";

fn stmt_for<'c>(
    conn: &'c rusqlite::Connection,
    tail: &str,
) -> Result<rusqlite::Statement<'c>, rusqlite::Error> {
    conn.prepare(&format!("{SELECT_ATTEMPT} {tail}"))
}

fn map_attempt(row: &Row<'_>) -> Result<AttemptRow, rusqlite::Error> {
    Ok(AttemptRow {
        id: row.get(0)?,
        alert_id: row.get(1)?,
        contact_id: row.get(2)?,
        contact_name: row.get(3)?,
        contact_phone: row.get(4)?,
        contact_email: row.get(5)?,
        channel: row.get(6)?,
        status: row.get(7)?,
        attempt_count: row.get(8)?,
        priority: row.get(9)?,
        seq: row.get(10)?,
        last_attempt_at: row.get(11)?,
        next_attempt_at: row.get(12)?,
        failure_reason: row.get(13)?,
        created_at: row.get(14)?,
    })
}
