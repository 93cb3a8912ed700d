//! Database row types mapping directly to SQLite rows, distinct from the
//! aegis-types API models so the DB layer stays independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ContactRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub priority: i64,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct AlertRow {
    pub id: String,
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: String,
    pub resolved_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AttemptRow {
    pub id: String,
    pub alert_id: String,
    pub contact_id: String,
    pub contact_name: String,
    pub contact_phone: String,
    pub contact_email: Option<String>,
    pub channel: String,
    pub status: String,
    pub attempt_count: i64,
    pub priority: i64,
    pub seq: i64,
    pub last_attempt_at: Option<String>,
    pub next_attempt_at: String,
    pub failure_reason: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct TimerRow {
    pub id: String,
    pub user_id: String,
    pub duration_seconds: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub status: String,
    pub started_at: String,
    pub expires_at: String,
    pub ended_at: Option<String>,
}
