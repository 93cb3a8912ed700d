use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

use aegis_types::models::AlertStatus;

use crate::models::AlertRow;
use crate::queries::OptionalExt;
use crate::{Database, StoreError, StoreResult, to_ts};

impl Database {
    pub fn create_alert(
        &self,
        id: &str,
        user_id: &str,
        latitude: f64,
        longitude: f64,
        now: DateTime<Utc>,
    ) -> StoreResult<AlertRow> {
        validate_coordinates(latitude, longitude)?;

        self.with_conn_mut(|conn| {
            insert_alert(conn, id, user_id, latitude, longitude, now)?;
            get_alert_row(conn, id)?.ok_or(StoreError::NotFound)
        })
    }

    /// Fetch without an ownership check, for dispatcher internals only.
    pub fn alert_by_id(&self, id: &str) -> StoreResult<Option<AlertRow>> {
        self.with_conn(|conn| get_alert_row(conn, id))
    }

    pub fn get_alert(&self, id: &str, user_id: &str) -> StoreResult<AlertRow> {
        self.with_conn(|conn| {
            let alert = get_alert_row(conn, id)?.ok_or(StoreError::NotFound)?;
            if alert.user_id != user_id {
                // Not owned by the caller, indistinguishable from absent.
                return Err(StoreError::NotFound);
            }
            Ok(alert)
        })
    }

    pub fn list_alerts(&self, user_id: &str) -> StoreResult<Vec<AlertRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, latitude, longitude, status, notes, created_at, resolved_at
                 FROM panic_alerts WHERE user_id = ?1
                 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], map_alert)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// One-directional transition out of ACTIVE. The conditional UPDATE under
    /// the writer lock makes concurrent transitions first-writer-wins: the
    /// loser matches zero rows and gets `InvalidTransition`.
    pub fn transition_alert(
        &self,
        id: &str,
        user_id: &str,
        new_status: AlertStatus,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<AlertRow> {
        if !new_status.is_terminal() {
            return Err(StoreError::InvalidInput(
                "alerts can only transition to RESOLVED or FALSE_ALARM".into(),
            ));
        }

        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE panic_alerts
                 SET status = ?1, resolved_at = ?2, notes = COALESCE(?3, notes)
                 WHERE id = ?4 AND user_id = ?5 AND status = 'ACTIVE'",
                params![new_status.as_str(), to_ts(now), notes, id, user_id],
            )?;

            let alert = get_alert_row(conn, id)?.ok_or(StoreError::NotFound)?;
            if alert.user_id != user_id {
                return Err(StoreError::NotFound);
            }
            if changed == 0 {
                return Err(StoreError::InvalidTransition);
            }
            Ok(alert)
        })
    }

    /// Lifecycle check for the dispatcher: only ACTIVE alerts keep dispatching.
    pub fn alert_is_active(&self, id: &str) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let status: Option<String> = conn
                .query_row("SELECT status FROM panic_alerts WHERE id = ?1", [id], |r| {
                    r.get(0)
                })
                .optional()?;
            Ok(status.as_deref() == Some(AlertStatus::Active.as_str()))
        })
    }
}

pub fn validate_coordinates(latitude: f64, longitude: f64) -> StoreResult<()> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(StoreError::InvalidInput(format!(
            "latitude {} out of range [-90, 90]",
            latitude
        )));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(StoreError::InvalidInput(format!(
            "longitude {} out of range [-180, 180]",
            longitude
        )));
    }
    Ok(())
}

pub(crate) fn insert_alert(
    conn: &Connection,
    id: &str,
    user_id: &str,
    latitude: f64,
    longitude: f64,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO panic_alerts (id, user_id, latitude, longitude, status, created_at)
         VALUES (?1, ?2, ?3, ?4, 'ACTIVE', ?5)",
        params![id, user_id, latitude, longitude, to_ts(now)],
    )?;
    Ok(())
}

fn get_alert_row(conn: &Connection, id: &str) -> StoreResult<Option<AlertRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, latitude, longitude, status, notes, created_at, resolved_at
         FROM panic_alerts WHERE id = ?1",
    )?;
    let row = stmt.query_row([id], map_alert).optional()?;
    Ok(row)
}

fn map_alert(row: &Row<'_>) -> Result<AlertRow, rusqlite::Error> {
    Ok(AlertRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        latitude: row.get(2)?,
        longitude: row.get(3)?,
        status: row.get(4)?,
        notes: row.get(5)?,
        created_at: row.get(6)?,
        resolved_at: row.get(7)?,
    })
}
