use rusqlite::{Connection, Row, params};

use crate::models::ContactRow;
use crate::queries::OptionalExt;
use crate::{Database, StoreError, StoreResult, to_ts};

/// The roster holds at most this many active contacts per user.
pub const MAX_ACTIVE_CONTACTS: i64 = 3;

/// Partial update; `None` fields keep their current value. `email` carries
/// a second level so `Some(None)` clears the address.
#[derive(Debug, Default)]
pub struct ContactUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<Option<String>>,
    pub priority: Option<i64>,
    pub is_active: Option<bool>,
}

impl Database {
    /// Active roster, notification order: priority ascending, ties broken by
    /// creation time.
    pub fn list_contacts(&self, user_id: &str) -> StoreResult<Vec<ContactRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, name, phone, email, priority, is_active, created_at
                 FROM trusted_contacts
                 WHERE user_id = ?1 AND is_active = 1
                 ORDER BY priority ASC, created_at ASC",
            )?;
            let rows = stmt
                .query_map([user_id], map_contact)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn create_contact(
        &self,
        id: &str,
        user_id: &str,
        name: &str,
        phone: &str,
        email: Option<&str>,
        priority: i64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> StoreResult<ContactRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            // Capacity check inside the write transaction so concurrent adds
            // cannot push the roster past the cap.
            if active_count(&tx, user_id)? >= MAX_ACTIVE_CONTACTS {
                return Err(StoreError::CapacityExceeded);
            }

            tx.execute(
                "INSERT INTO trusted_contacts (id, user_id, name, phone, email, priority, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id, user_id, name, phone, email, priority, to_ts(now)],
            )?;

            let row = get_contact(&tx, id, user_id)?.ok_or(StoreError::NotFound)?;
            tx.commit()?;
            Ok(row)
        })
    }

    pub fn update_contact(
        &self,
        id: &str,
        user_id: &str,
        update: ContactUpdate,
    ) -> StoreResult<ContactRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing = get_contact(&tx, id, user_id)?.ok_or(StoreError::NotFound)?;

            // Re-activating counts against the roster cap.
            if update.is_active == Some(true)
                && !existing.is_active
                && active_count(&tx, user_id)? >= MAX_ACTIVE_CONTACTS
            {
                return Err(StoreError::CapacityExceeded);
            }

            let email = match &update.email {
                Some(value) => value.as_deref(),
                None => existing.email.as_deref(),
            };
            tx.execute(
                "UPDATE trusted_contacts
                 SET name = ?1, phone = ?2, email = ?3, priority = ?4, is_active = ?5
                 WHERE id = ?6 AND user_id = ?7",
                params![
                    update.name.as_deref().unwrap_or(&existing.name),
                    update.phone.as_deref().unwrap_or(&existing.phone),
                    email,
                    update.priority.unwrap_or(existing.priority),
                    update.is_active.unwrap_or(existing.is_active),
                    id,
                    user_id
                ],
            )?;

            let row = get_contact(&tx, id, user_id)?.ok_or(StoreError::NotFound)?;
            tx.commit()?;
            Ok(row)
        })
    }

    /// Remove a contact from the roster. Contacts referenced by delivery
    /// history are soft-deactivated so the audit trail keeps a valid owner;
    /// untouched contacts are hard-deleted.
    pub fn delete_contact(&self, id: &str, user_id: &str) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if get_contact(&tx, id, user_id)?.is_none() {
                return Err(StoreError::NotFound);
            }

            let has_history: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM notification_attempts WHERE contact_id = ?1)",
                [id],
                |row| row.get(0),
            )?;

            if has_history {
                tx.execute(
                    "UPDATE trusted_contacts SET is_active = 0 WHERE id = ?1",
                    [id],
                )?;
            } else {
                tx.execute("DELETE FROM trusted_contacts WHERE id = ?1", [id])?;
            }

            tx.commit()?;
            Ok(())
        })
    }
}

fn active_count(conn: &Connection, user_id: &str) -> StoreResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM trusted_contacts WHERE user_id = ?1 AND is_active = 1",
        [user_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn get_contact(conn: &Connection, id: &str, user_id: &str) -> StoreResult<Option<ContactRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, name, phone, email, priority, is_active, created_at
         FROM trusted_contacts WHERE id = ?1 AND user_id = ?2",
    )?;
    let row = stmt.query_row([id, user_id], map_contact).optional()?;
    Ok(row)
}

fn map_contact(row: &Row<'_>) -> Result<ContactRow, rusqlite::Error> {
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
}
