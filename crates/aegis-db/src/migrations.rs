use rusqlite::Connection;
use tracing::info;

use crate::StoreResult;

pub fn run(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            full_name   TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS trusted_contacts (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id),
            name        TEXT NOT NULL,
            phone       TEXT NOT NULL,
            email       TEXT,
            priority    INTEGER NOT NULL DEFAULT 1,
            is_active   INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_contacts_user
            ON trusted_contacts(user_id, is_active, priority);

        CREATE TABLE IF NOT EXISTS panic_alerts (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id),
            latitude    REAL NOT NULL,
            longitude   REAL NOT NULL,
            status      TEXT NOT NULL DEFAULT 'ACTIVE',
            notes       TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            resolved_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_alerts_user
            ON panic_alerts(user_id, created_at);

        -- Audit trail: one row per (alert, contact, channel). Contact fields
        -- are a snapshot so history survives contact deletion.
        CREATE TABLE IF NOT EXISTS notification_attempts (
            id              TEXT PRIMARY KEY,
            alert_id        TEXT NOT NULL REFERENCES panic_alerts(id),
            contact_id      TEXT NOT NULL,
            contact_name    TEXT NOT NULL,
            contact_phone   TEXT NOT NULL,
            contact_email   TEXT,
            channel         TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'PENDING',
            attempt_count   INTEGER NOT NULL DEFAULT 0,
            priority        INTEGER NOT NULL,
            seq             INTEGER NOT NULL,
            last_attempt_at TEXT,
            next_attempt_at TEXT NOT NULL,
            failure_reason  TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(alert_id, contact_id, channel)
        );

        CREATE INDEX IF NOT EXISTS idx_attempts_due
            ON notification_attempts(status, next_attempt_at);

        CREATE TABLE IF NOT EXISTS timer_sessions (
            id               TEXT PRIMARY KEY,
            user_id          TEXT NOT NULL REFERENCES users(id),
            duration_seconds INTEGER NOT NULL,
            latitude         REAL NOT NULL,
            longitude        REAL NOT NULL,
            status           TEXT NOT NULL DEFAULT 'RUNNING',
            started_at       TEXT NOT NULL,
            expires_at       TEXT NOT NULL,
            ended_at         TEXT
        );

        -- Single authoritative RUNNING session per user.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_timer_running
            ON timer_sessions(user_id) WHERE status = 'RUNNING';
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
