use rusqlite::Connection;

use crate::models::UserRow;
use crate::queries::OptionalExt;
use crate::{Database, StoreError, StoreResult};

impl Database {
    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        password_hash: &str,
        full_name: &str,
    ) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password, full_name) VALUES (?1, ?2, ?3, ?4)",
                (id, email, password_hash, full_name),
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StoreError::Duplicate("user with this email".into())
                }
                other => other.into(),
            })?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> StoreResult<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> StoreResult<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> StoreResult<Option<UserRow>> {
    let sql = format!(
        "SELECT id, email, password, full_name, created_at FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                password: row.get(2)?,
                full_name: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}
