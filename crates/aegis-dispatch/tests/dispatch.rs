//! Dispatcher behavior against a scriptable gateway: fan-out ordering,
//! retry/backoff to terminal failure, configuration-error aborts, halted
//! dispatch for resolved alerts, and timer-expiry escalation.

use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use uuid::Uuid;

use aegis_db::Database;
use aegis_dispatch::dispatcher::{Dispatcher, MAX_ATTEMPTS, backoff_delay};
use aegis_dispatch::gateway::{GatewayError, NotificationGateway, SendOutcome};
use aegis_dispatch::timer::expire_due;
use aegis_types::models::{AlertStatus, AttemptStatus, Channel, DeliverySummary};

const MOM_PHONE: &str = "+94771234567";
const DAD_PHONE: &str = "+94772345678";

/// Scripted response for one send. Unscripted sends succeed with `Sent`.
enum Script {
    Ok(SendOutcome),
    Fail(&'static str),
    Config(&'static str),
    /// Never completes, exercises the per-attempt timeout.
    Hang,
}

#[derive(Clone, Default)]
struct MockGateway {
    calls: Arc<Mutex<Vec<(Channel, String)>>>,
    scripts: Arc<Mutex<HashMap<String, VecDeque<Script>>>>,
}

impl MockGateway {
    fn script(&self, address: &str, steps: Vec<Script>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(address.to_string(), steps.into());
    }

    fn calls(&self) -> Vec<(Channel, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl NotificationGateway for MockGateway {
    async fn send(
        &self,
        channel: Channel,
        address: &str,
        _payload: &str,
    ) -> Result<SendOutcome, GatewayError> {
        self.calls
            .lock()
            .unwrap()
            .push((channel, address.to_string()));

        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(address)
            .and_then(|q| q.pop_front());

        match step {
            None => Ok(SendOutcome::Sent),
            Some(Script::Ok(outcome)) => Ok(outcome),
            Some(Script::Fail(reason)) => Err(GatewayError::Delivery(reason.into())),
            Some(Script::Config(reason)) => Err(GatewayError::Configuration(reason.into())),
            Some(Script::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(SendOutcome::Sent)
            }
        }
    }
}

fn t0() -> DateTime<Utc> {
    "2026-08-24T10:00:00Z".parse().unwrap()
}

struct Fixture {
    db: Arc<Database>,
    gateway: MockGateway,
    dispatcher: Dispatcher<MockGateway>,
    user_id: String,
}

/// User with two SMS-only contacts: Mom (priority 1) and Dad (priority 2).
fn fixture() -> Fixture {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let user_id = Uuid::new_v4().to_string();
    db.create_user(&user_id, "user@example.com", "hash", "Test User")
        .unwrap();
    db.create_contact(&Uuid::new_v4().to_string(), &user_id, "Mom", MOM_PHONE, None, 1, t0())
        .unwrap();
    db.create_contact(&Uuid::new_v4().to_string(), &user_id, "Dad", DAD_PHONE, None, 2, t0())
        .unwrap();

    let gateway = MockGateway::default();
    let dispatcher = Dispatcher::new(db.clone(), gateway.clone(), Duration::from_secs(10));

    Fixture {
        db,
        gateway,
        dispatcher,
        user_id,
    }
}

impl Fixture {
    fn trigger_alert(&self) -> String {
        let alert = self
            .db
            .create_alert(&Uuid::new_v4().to_string(), &self.user_id, 6.8649, 79.9738, t0())
            .unwrap();
        self.db.fan_out(&alert.id, &self.user_id, t0()).unwrap();
        alert.id
    }

    fn statuses(&self, alert_id: &str) -> Vec<(String, AttemptStatus)> {
        self.db
            .attempts_for_alert(alert_id)
            .unwrap()
            .into_iter()
            .map(|a| (a.contact_name, AttemptStatus::from_str(&a.status).unwrap()))
            .collect()
    }

    fn summary(&self, alert_id: &str) -> DeliverySummary {
        DeliverySummary::from_attempts(self.statuses(alert_id).into_iter().map(|(_, s)| s))
    }
}

#[test]
fn backoff_schedule_is_1_4_16_64() {
    let secs: Vec<i64> = (1..MAX_ATTEMPTS)
        .map(|n| backoff_delay(n).num_seconds())
        .collect();
    assert_eq!(secs, [1, 4, 16, 64]);
}

#[tokio::test]
async fn dispatch_notifies_mom_then_dad() {
    let fx = fixture();
    let alert_id = fx.trigger_alert();

    fx.dispatcher.pump(t0()).await.unwrap();

    assert_eq!(
        fx.gateway.calls(),
        [(Channel::Sms, MOM_PHONE.into()), (Channel::Sms, DAD_PHONE.into())]
    );
    assert_eq!(
        fx.statuses(&alert_id),
        [("Mom".into(), AttemptStatus::Sent), ("Dad".into(), AttemptStatus::Sent)]
    );
    assert_eq!(fx.summary(&alert_id), DeliverySummary::All);
}

#[tokio::test]
async fn synchronous_confirmation_marks_delivered() {
    let fx = fixture();
    let alert_id = fx.trigger_alert();
    fx.gateway
        .script(MOM_PHONE, vec![Script::Ok(SendOutcome::Delivered)]);

    fx.dispatcher.pump(t0()).await.unwrap();

    assert_eq!(
        fx.statuses(&alert_id),
        [
            ("Mom".into(), AttemptStatus::Delivered),
            ("Dad".into(), AttemptStatus::Sent)
        ]
    );
}

#[tokio::test]
async fn five_failures_reach_terminal_failed() {
    let fx = fixture();
    let alert_id = fx.trigger_alert();
    fx.gateway.script(
        MOM_PHONE,
        vec![
            Script::Fail("provider down"),
            Script::Fail("provider down"),
            Script::Fail("provider down"),
            Script::Fail("provider down"),
            Script::Fail("provider down"),
        ],
    );

    // Walk the backoff schedule: due immediately, then +1s, +4s, +16s, +64s.
    let mut at = t0();
    fx.dispatcher.pump(at).await.unwrap();
    for failures in 1..MAX_ATTEMPTS {
        at += backoff_delay(failures);
        fx.dispatcher.pump(at).await.unwrap();
    }

    let attempts = fx.db.attempts_for_alert(&alert_id).unwrap();
    let mom = &attempts[0];
    assert_eq!(mom.status, "FAILED");
    assert_eq!(mom.attempt_count, MAX_ATTEMPTS);
    assert_eq!(mom.failure_reason.as_deref(), Some("provider down"));

    // Terminal: a much later pass never touches it again.
    let calls_before = fx.gateway.calls().len();
    fx.dispatcher.pump(at + ChronoDuration::hours(1)).await.unwrap();
    assert_eq!(fx.gateway.calls().len(), calls_before);

    assert_eq!(fx.summary(&alert_id), DeliverySummary::Partial);
}

#[tokio::test]
async fn success_on_third_attempt_stops_retrying() {
    let fx = fixture();
    let alert_id = fx.trigger_alert();
    fx.gateway.script(
        MOM_PHONE,
        vec![Script::Fail("blip"), Script::Fail("blip")],
    );

    fx.dispatcher.pump(t0()).await.unwrap();
    fx.dispatcher.pump(t0() + backoff_delay(1)).await.unwrap();
    fx.dispatcher
        .pump(t0() + backoff_delay(1) + backoff_delay(2))
        .await
        .unwrap();

    let attempts = fx.db.attempts_for_alert(&alert_id).unwrap();
    let mom = &attempts[0];
    assert_eq!(mom.status, "SENT");
    assert_eq!(mom.attempt_count, 3);
    assert!(mom.failure_reason.is_none());

    // Nothing left due: no further sends for Mom.
    let mom_calls = |fx: &Fixture| {
        fx.gateway
            .calls()
            .iter()
            .filter(|(_, addr)| addr == MOM_PHONE)
            .count()
    };
    let before = mom_calls(&fx);
    fx.dispatcher.pump(t0() + ChronoDuration::hours(1)).await.unwrap();
    assert_eq!(mom_calls(&fx), before);
}

#[tokio::test]
async fn configuration_error_aborts_the_whole_batch() {
    let fx = fixture();
    let alert_id = fx.trigger_alert();
    fx.gateway
        .script(MOM_PHONE, vec![Script::Config("bad credentials")]);

    fx.dispatcher.pump(t0()).await.unwrap();

    // Dad was never attempted; both rows are FAILED with the config reason.
    assert_eq!(fx.gateway.calls().len(), 1);
    for attempt in fx.db.attempts_for_alert(&alert_id).unwrap() {
        assert_eq!(attempt.status, "FAILED");
        assert!(
            attempt
                .failure_reason
                .as_deref()
                .unwrap()
                .contains("configuration error")
        );
    }
}

#[tokio::test]
async fn resolved_alert_stops_scheduling() {
    let fx = fixture();
    let alert_id = fx.trigger_alert();

    fx.db
        .transition_alert(&alert_id, &fx.user_id, AlertStatus::Resolved, None, t0())
        .unwrap();
    fx.dispatcher.pump(t0()).await.unwrap();

    assert!(fx.gateway.calls().is_empty());
    assert_eq!(
        fx.statuses(&alert_id),
        [
            ("Mom".into(), AttemptStatus::Pending),
            ("Dad".into(), AttemptStatus::Pending)
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn hung_send_counts_as_a_failure() {
    let fx = fixture();
    let alert_id = fx.trigger_alert();
    fx.gateway.script(MOM_PHONE, vec![Script::Hang]);

    fx.dispatcher.pump(t0()).await.unwrap();

    let attempts = fx.db.attempts_for_alert(&alert_id).unwrap();
    let mom = &attempts[0];
    assert_eq!(mom.status, "PENDING");
    assert_eq!(mom.attempt_count, 1);
    assert!(mom.failure_reason.as_deref().unwrap().contains("timed out"));

    // Dad still got his notification after Mom's send timed out.
    assert_eq!(attempts[1].status, "SENT");
}

#[tokio::test]
async fn expired_timer_escalates_to_an_alert() {
    let fx = fixture();
    fx.db
        .start_timer(&Uuid::new_v4().to_string(), &fx.user_id, 1800, 6.8649, 79.9738, t0())
        .unwrap();

    // One second early: nothing fires.
    assert_eq!(expire_due(&fx.db, t0() + ChronoDuration::seconds(1799)).unwrap(), 0);
    assert!(fx.db.list_alerts(&fx.user_id).unwrap().is_empty());

    let deadline = t0() + ChronoDuration::seconds(1800);
    assert_eq!(expire_due(&fx.db, deadline).unwrap(), 1);

    let session = fx.db.running_timer(&fx.user_id).unwrap();
    assert!(session.is_none());

    let alerts = fx.db.list_alerts(&fx.user_id).unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].status, "ACTIVE");
    assert_eq!(alerts[0].latitude, 6.8649);
    assert_eq!(alerts[0].longitude, 79.9738);

    // The fan-out is queued and the dispatcher picks it up.
    fx.dispatcher.pump(deadline).await.unwrap();
    assert_eq!(fx.summary(&alerts[0].id), DeliverySummary::All);

    // Escalation is one-shot.
    assert_eq!(expire_due(&fx.db, deadline + ChronoDuration::seconds(5)).unwrap(), 0);
}

#[tokio::test]
async fn checked_in_timer_never_escalates() {
    let fx = fixture();
    fx.db
        .start_timer(&Uuid::new_v4().to_string(), &fx.user_id, 1800, 0.0, 0.0, t0())
        .unwrap();
    fx.db
        .finish_timer(&fx.user_id, aegis_types::models::TimerStatus::CheckedIn, t0())
        .unwrap();

    assert_eq!(expire_due(&fx.db, t0() + ChronoDuration::seconds(3600)).unwrap(), 0);
    assert!(fx.db.list_alerts(&fx.user_id).unwrap().is_empty());
}
