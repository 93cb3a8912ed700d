use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tracing::{debug, error, info, warn};

use aegis_db::models::AttemptRow;
use aegis_db::{Database, StoreResult};
use aegis_types::models::Channel;

use crate::gateway::{GatewayError, NotificationGateway, SendOutcome};

/// Retry budget per attempt row. The fifth consecutive failure is terminal.
pub const MAX_ATTEMPTS: i64 = 5;

/// Exponential backoff after the n-th failure: 1s, 4s, 16s, 64s.
pub fn backoff_delay(failures: i64) -> chrono::Duration {
    let exp = (failures - 1).clamp(0, 8) as u32;
    chrono::Duration::seconds(4i64.pow(exp))
}

/// Processes PENDING notification attempts: invokes the gateway per attempt,
/// records outcomes, and requeues failures with backoff. One batch per alert
/// is in flight at a time, and attempts inside a batch run sequentially, so
/// a given (alert, contact, channel) key never has two concurrent sends.
pub struct Dispatcher<G> {
    inner: Arc<Inner<G>>,
}

impl<G> Clone for Dispatcher<G> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<G> {
    db: Arc<Database>,
    gateway: G,
    send_timeout: Duration,
    in_flight: Mutex<HashSet<String>>,
}

impl<G: NotificationGateway> Dispatcher<G> {
    pub fn new(db: Arc<Database>, gateway: G, send_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                gateway,
                send_timeout,
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Background worker loop. Polls for due attempts on an interval and
    /// dispatches each alert's batch.
    pub async fn run(self, poll_interval: Duration) {
        let mut interval = tokio::time::interval(poll_interval);
        loop {
            interval.tick().await;
            if let Err(e) = self.pump(Utc::now()).await {
                warn!("Dispatch pass failed: {}", e);
            }
        }
    }

    /// One scheduling pass at `now`: batches for distinct alerts run
    /// concurrently, attempts within a batch sequentially.
    pub async fn pump(&self, now: DateTime<Utc>) -> StoreResult<()> {
        let due = self.inner.db.due_alert_ids(now)?;

        let batches: Vec<_> = due
            .into_iter()
            .filter(|alert_id| self.claim(alert_id))
            .map(|alert_id| {
                let this = self.clone();
                async move {
                    if let Err(e) = this.process_alert(&alert_id, now).await {
                        warn!("Dispatch for alert {} failed: {}", alert_id, e);
                    }
                    this.release(&alert_id);
                }
            })
            .collect();

        join_all(batches).await;
        Ok(())
    }

    /// Process every attempt currently due for one alert, in roster order.
    /// Retried attempts become due again later and are picked up by a
    /// subsequent pass.
    pub async fn process_alert(&self, alert_id: &str, now: DateTime<Utc>) -> StoreResult<()> {
        let db = &self.inner.db;

        let Some(alert) = db.alert_by_id(alert_id)? else {
            warn!("Attempts reference unknown alert {}", alert_id);
            return Ok(());
        };

        let payload = self.payload_for(&alert)?;

        for attempt in db.due_attempts_for_alert(alert_id, now)? {
            // A resolved or false-alarm alert stops scheduling; whatever is
            // already in flight completes, the rest stays untouched.
            if !db.alert_is_active(alert_id)? {
                debug!("Alert {} left ACTIVE state, halting dispatch", alert_id);
                return Ok(());
            }

            match self.send_one(&attempt, &payload).await {
                SendResult::Ok(outcome) => {
                    info!(
                        "Notified {} over {} for alert {} (attempt {})",
                        attempt.contact_name,
                        attempt.channel,
                        alert_id,
                        attempt.attempt_count + 1
                    );
                    db.mark_attempt_sent(
                        &attempt.id,
                        outcome == SendOutcome::Delivered,
                        attempt.attempt_count + 1,
                        now,
                    )?;
                }
                SendResult::Retryable(reason) => {
                    self.record_failure(&attempt, &reason, now)?;
                }
                SendResult::Fatal(reason) => {
                    error!(
                        "Gateway misconfigured, aborting batch for alert {}: {}",
                        alert_id, reason
                    );
                    db.fail_all_pending(
                        alert_id,
                        &format!("configuration error: {}", reason),
                        now,
                    )?;
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    async fn send_one(&self, attempt: &AttemptRow, payload: &str) -> SendResult {
        let channel: Channel = match attempt.channel.parse() {
            Ok(c) => c,
            Err(e) => return SendResult::Fatal(e.to_string()),
        };
        let address = match channel {
            Channel::Email => attempt.contact_email.clone().unwrap_or_default(),
            Channel::Sms | Channel::Push => attempt.contact_phone.clone(),
        };

        let send = self.inner.gateway.send(channel, &address, payload);
        match tokio::time::timeout(self.inner.send_timeout, send).await {
            Ok(Ok(outcome)) => SendResult::Ok(outcome),
            Ok(Err(GatewayError::Delivery(reason))) => SendResult::Retryable(reason),
            Ok(Err(GatewayError::Configuration(reason))) => SendResult::Fatal(reason),
            Err(_) => SendResult::Retryable(format!(
                "send timed out after {:?}",
                self.inner.send_timeout
            )),
        }
    }

    fn record_failure(
        &self,
        attempt: &AttemptRow,
        reason: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let failures = attempt.attempt_count + 1;
        if failures >= MAX_ATTEMPTS {
            warn!(
                "Attempt {} exhausted its retry budget ({}): {}",
                attempt.id, failures, reason
            );
            self.inner
                .db
                .mark_attempt_failed(&attempt.id, failures, reason, now)
        } else {
            let next = now + backoff_delay(failures);
            debug!(
                "Attempt {} failed ({}/{}), retrying at {}: {}",
                attempt.id, failures, MAX_ATTEMPTS, next, reason
            );
            self.inner
                .db
                .mark_attempt_retry(&attempt.id, failures, reason, now, next)
        }
    }

    fn payload_for(&self, alert: &aegis_db::models::AlertRow) -> StoreResult<String> {
        let full_name = self
            .inner
            .db
            .get_user_by_id(&alert.user_id)?
            .map(|u| u.full_name)
            .unwrap_or_else(|| "An Aegis user".into());

        Ok(serde_json::json!({
            "alert_id": alert.id,
            "message": format!(
                "EMERGENCY: {} triggered a panic alert and may need help.",
                full_name
            ),
            "latitude": alert.latitude,
            "longitude": alert.longitude,
            "maps_url": format!(
                "https://maps.google.com/?q={},{}",
                alert.latitude, alert.longitude
            ),
        })
        .to_string())
    }

    fn claim(&self, alert_id: &str) -> bool {
        match self.inner.in_flight.lock() {
            Ok(mut set) => set.insert(alert_id.to_string()),
            Err(_) => false,
        }
    }

    fn release(&self, alert_id: &str) {
        if let Ok(mut set) = self.inner.in_flight.lock() {
            set.remove(alert_id);
        }
    }
}

enum SendResult {
    Ok(SendOutcome),
    Retryable(String),
    Fatal(String),
}
