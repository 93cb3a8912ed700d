use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use aegis_db::{Database, StoreResult};

/// Background task that escalates expired safety timers.
///
/// Ticks every `poll_interval` (1s in production, well inside the 2s drift
/// target), finds RUNNING sessions past their deadline, marks them EXPIRED,
/// creates an ACTIVE panic alert at the session's last known location, and
/// fans it out to the roster. The countdown is entirely server-owned: the
/// client going away does not stop escalation.
pub async fn run_timer_loop(db: Arc<Database>, poll_interval: Duration) {
    let mut interval = tokio::time::interval(poll_interval);
    loop {
        interval.tick().await;
        match expire_due(&db, Utc::now()) {
            Ok(count) => {
                if count > 0 {
                    info!("Safety timer: escalated {} expired session(s)", count);
                }
            }
            Err(e) => warn!("Safety timer pass failed: {}", e),
        }
    }
}

/// One expiry pass at `now`. Returns how many sessions escalated.
pub fn expire_due(db: &Database, now: DateTime<Utc>) -> StoreResult<usize> {
    let mut fired = 0usize;

    for session in db.overdue_timers(now)? {
        let alert_id = Uuid::new_v4().to_string();

        // Atomic expiry: loses to a concurrent check-in or cancel, and a
        // failed alert insert rolls the session back to RUNNING for the
        // next pass.
        let Some(attempts) = db.escalate_expired_timer(&session.id, &alert_id, now)? else {
            continue;
        };

        info!(
            "Timer session {} expired without check-in; created alert {} ({} attempt(s) queued)",
            session.id, alert_id, attempts
        );
        fired += 1;
    }

    Ok(fired)
}
