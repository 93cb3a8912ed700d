//! Store-level behavior: roster capacity, alert lifecycle, fan-out
//! snapshots, and timer session invariants, all against in-memory SQLite.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use aegis_db::queries::contacts::ContactUpdate;
use aegis_db::{Database, StoreError};
use aegis_types::models::{AlertStatus, TimerStatus};

fn now() -> DateTime<Utc> {
    "2026-08-24T10:00:00Z".parse().unwrap()
}

fn new_user(db: &Database) -> String {
    let id = Uuid::new_v4().to_string();
    db.create_user(&id, &format!("{}@example.com", &id[..8]), "hash", "Test User")
        .unwrap();
    id
}

fn add_contact(db: &Database, user_id: &str, name: &str, priority: i64, at: DateTime<Utc>) -> String {
    let id = Uuid::new_v4().to_string();
    db.create_contact(&id, user_id, name, "+94771234567", None, priority, at)
        .unwrap();
    id
}

#[test]
fn duplicate_email_is_rejected() {
    let db = Database::open_in_memory().unwrap();
    db.create_user("u1", "kay@example.com", "hash", "Kay").unwrap();

    let err = db
        .create_user("u2", "kay@example.com", "hash", "Other Kay")
        .unwrap_err();
    assert!(matches!(err, StoreError::Duplicate(_)));
}

#[test]
fn roster_capacity_is_three_active_contacts() {
    let db = Database::open_in_memory().unwrap();
    let user = new_user(&db);

    for (i, name) in ["Mom", "Dad", "Friend"].iter().enumerate() {
        add_contact(&db, &user, name, (i + 1) as i64, now());
    }

    let err = db
        .create_contact(
            &Uuid::new_v4().to_string(),
            &user,
            "Fourth",
            "+94770000000",
            None,
            4,
            now(),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::CapacityExceeded));
    assert_eq!(db.list_contacts(&user).unwrap().len(), 3);
}

#[test]
fn roster_orders_by_priority_then_creation() {
    let db = Database::open_in_memory().unwrap();
    let user = new_user(&db);

    add_contact(&db, &user, "Second", 2, now());
    add_contact(&db, &user, "First", 1, now() + Duration::seconds(1));
    add_contact(&db, &user, "Third", 2, now() + Duration::seconds(2));

    let names: Vec<String> = db
        .list_contacts(&user)
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, ["First", "Second", "Third"]);
}

#[test]
fn reactivating_a_contact_counts_against_the_cap() {
    let db = Database::open_in_memory().unwrap();
    let user = new_user(&db);

    let dormant = add_contact(&db, &user, "Dormant", 1, now());
    db.update_contact(
        &dormant,
        &user,
        ContactUpdate {
            is_active: Some(false),
            ..Default::default()
        },
    )
    .unwrap();

    for name in ["A", "B", "C"] {
        add_contact(&db, &user, name, 1, now());
    }

    let err = db
        .update_contact(
            &dormant,
            &user,
            ContactUpdate {
                is_active: Some(true),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::CapacityExceeded));
}

#[test]
fn contact_email_can_be_cleared() {
    let db = Database::open_in_memory().unwrap();
    let user = new_user(&db);
    let contact = Uuid::new_v4().to_string();
    db.create_contact(&contact, &user, "Mom", "+94771234567", Some("mom@example.com"), 1, now())
        .unwrap();

    // Omitted email keeps the stored address.
    let kept = db
        .update_contact(
            &contact,
            &user,
            ContactUpdate {
                name: Some("Mum".into()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(kept.email.as_deref(), Some("mom@example.com"));

    // An explicit null clears it.
    let cleared = db
        .update_contact(
            &contact,
            &user,
            ContactUpdate {
                email: Some(None),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(cleared.email.is_none());
}

#[test]
fn contact_updates_require_ownership() {
    let db = Database::open_in_memory().unwrap();
    let owner = new_user(&db);
    let stranger = new_user(&db);
    let contact = add_contact(&db, &owner, "Mom", 1, now());

    let err = db
        .update_contact(&contact, &stranger, ContactUpdate::default())
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound));

    let err = db.delete_contact(&contact, &stranger).unwrap_err();
    assert!(matches!(err, StoreError::NotFound));
}

#[test]
fn contact_with_delivery_history_is_soft_deactivated() {
    let db = Database::open_in_memory().unwrap();
    let user = new_user(&db);
    let contact = add_contact(&db, &user, "Mom", 1, now());

    let alert = db
        .create_alert(&Uuid::new_v4().to_string(), &user, 6.8649, 79.9738, now())
        .unwrap();
    db.fan_out(&alert.id, &user, now()).unwrap();

    db.delete_contact(&contact, &user).unwrap();

    // Gone from the roster, but the attempt snapshot survives.
    assert!(db.list_contacts(&user).unwrap().is_empty());
    let attempts = db.attempts_for_alert(&alert.id).unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].contact_name, "Mom");
    assert_eq!(attempts[0].contact_phone, "+94771234567");
}

#[test]
fn contact_without_history_is_hard_deleted() {
    let db = Database::open_in_memory().unwrap();
    let user = new_user(&db);
    let contact = add_contact(&db, &user, "Mom", 1, now());

    db.delete_contact(&contact, &user).unwrap();

    // A fresh add works: the row is gone, not deactivated.
    assert!(db.list_contacts(&user).unwrap().is_empty());
    let err = db
        .update_contact(&contact, &user, ContactUpdate::default())
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound));
}

#[test]
fn alert_coordinates_are_range_checked() {
    let db = Database::open_in_memory().unwrap();
    let user = new_user(&db);

    for (lat, lon) in [(91.0, 0.0), (-90.1, 0.0), (0.0, 180.5), (0.0, -181.0), (f64::NAN, 0.0)] {
        let err = db
            .create_alert(&Uuid::new_v4().to_string(), &user, lat, lon, now())
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)), "({}, {})", lat, lon);
    }

    let alert = db
        .create_alert(&Uuid::new_v4().to_string(), &user, -90.0, 180.0, now())
        .unwrap();
    assert_eq!(alert.status, "ACTIVE");
}

#[test]
fn alert_transitions_are_one_directional() {
    let db = Database::open_in_memory().unwrap();
    let user = new_user(&db);
    let alert = db
        .create_alert(&Uuid::new_v4().to_string(), &user, 6.8649, 79.9738, now())
        .unwrap();

    let resolved = db
        .transition_alert(&alert.id, &user, AlertStatus::Resolved, Some("all good"), now())
        .unwrap();
    assert_eq!(resolved.status, "RESOLVED");
    assert!(resolved.resolved_at.is_some());
    assert_eq!(resolved.notes.as_deref(), Some("all good"));

    // Second transition loses: status stays RESOLVED.
    let err = db
        .transition_alert(&alert.id, &user, AlertStatus::FalseAlarm, None, now())
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition));
    assert_eq!(db.get_alert(&alert.id, &user).unwrap().status, "RESOLVED");
}

#[test]
fn alert_transition_rejects_active_as_target() {
    let db = Database::open_in_memory().unwrap();
    let user = new_user(&db);
    let alert = db
        .create_alert(&Uuid::new_v4().to_string(), &user, 0.0, 0.0, now())
        .unwrap();

    let err = db
        .transition_alert(&alert.id, &user, AlertStatus::Active, None, now())
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput(_)));
}

#[test]
fn alerts_are_invisible_to_other_users() {
    let db = Database::open_in_memory().unwrap();
    let owner = new_user(&db);
    let stranger = new_user(&db);
    let alert = db
        .create_alert(&Uuid::new_v4().to_string(), &owner, 1.0, 2.0, now())
        .unwrap();

    assert!(matches!(
        db.get_alert(&alert.id, &stranger).unwrap_err(),
        StoreError::NotFound
    ));
    assert!(matches!(
        db.transition_alert(&alert.id, &stranger, AlertStatus::Resolved, None, now())
            .unwrap_err(),
        StoreError::NotFound
    ));
}

#[test]
fn fan_out_creates_one_attempt_per_contact_per_channel() {
    let db = Database::open_in_memory().unwrap();
    let user = new_user(&db);

    // Mom has an email address, Dad does not.
    db.create_contact(
        &Uuid::new_v4().to_string(),
        &user,
        "Mom",
        "+94771234567",
        Some("mom@example.com"),
        1,
        now(),
    )
    .unwrap();
    db.create_contact(
        &Uuid::new_v4().to_string(),
        &user,
        "Dad",
        "+94772345678",
        None,
        2,
        now(),
    )
    .unwrap();

    let alert = db
        .create_alert(&Uuid::new_v4().to_string(), &user, 6.8649, 79.9738, now())
        .unwrap();
    let created = db.fan_out(&alert.id, &user, now()).unwrap();
    assert_eq!(created, 3);

    let attempts = db.attempts_for_alert(&alert.id).unwrap();
    let summary: Vec<(String, String, String)> = attempts
        .iter()
        .map(|a| (a.contact_name.clone(), a.channel.clone(), a.status.clone()))
        .collect();
    assert_eq!(
        summary,
        [
            ("Mom".into(), "SMS".into(), "PENDING".into()),
            ("Mom".into(), "EMAIL".into(), "PENDING".into()),
            ("Dad".into(), "SMS".into(), "PENDING".into()),
        ]
    );
}

#[test]
fn fan_out_skips_deactivated_contacts() {
    let db = Database::open_in_memory().unwrap();
    let user = new_user(&db);

    let dormant = add_contact(&db, &user, "Dormant", 1, now());
    db.update_contact(
        &dormant,
        &user,
        ContactUpdate {
            is_active: Some(false),
            ..Default::default()
        },
    )
    .unwrap();
    add_contact(&db, &user, "Mom", 2, now());

    let alert = db
        .create_alert(&Uuid::new_v4().to_string(), &user, 0.0, 0.0, now())
        .unwrap();
    assert_eq!(db.fan_out(&alert.id, &user, now()).unwrap(), 1);
}

#[test]
fn starting_a_timer_cancels_the_previous_one() {
    let db = Database::open_in_memory().unwrap();
    let user = new_user(&db);

    let first = db
        .start_timer(&Uuid::new_v4().to_string(), &user, 1800, 6.8649, 79.9738, now())
        .unwrap();
    let second = db
        .start_timer(
            &Uuid::new_v4().to_string(),
            &user,
            900,
            6.8649,
            79.9738,
            now() + Duration::seconds(60),
        )
        .unwrap();

    let first = db.get_timer_by_id(&first.id).unwrap().unwrap();
    assert_eq!(first.status, "CANCELLED");
    assert!(first.ended_at.is_some());

    let running = db.running_timer(&user).unwrap().unwrap();
    assert_eq!(running.id, second.id);
    assert_eq!(running.duration_seconds, 900);
}

#[test]
fn check_in_requires_a_running_session() {
    let db = Database::open_in_memory().unwrap();
    let user = new_user(&db);

    let err = db
        .finish_timer(&user, TimerStatus::CheckedIn, now())
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound));

    db.start_timer(&Uuid::new_v4().to_string(), &user, 1800, 0.0, 0.0, now())
        .unwrap();
    let finished = db.finish_timer(&user, TimerStatus::CheckedIn, now()).unwrap();
    assert_eq!(finished.status, "CHECKED_IN");
    assert!(db.running_timer(&user).unwrap().is_none());
}

#[test]
fn overdue_scan_respects_the_deadline() {
    let db = Database::open_in_memory().unwrap();
    let user = new_user(&db);
    let timer = db
        .start_timer(&Uuid::new_v4().to_string(), &user, 1800, 0.0, 0.0, now())
        .unwrap();

    assert!(db.overdue_timers(now() + Duration::seconds(1799)).unwrap().is_empty());

    let overdue = db.overdue_timers(now() + Duration::seconds(1800)).unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].id, timer.id);
}

#[test]
fn expiry_loses_to_a_concurrent_check_in() {
    let db = Database::open_in_memory().unwrap();
    let user = new_user(&db);
    let timer = db
        .start_timer(&Uuid::new_v4().to_string(), &user, 1800, 0.0, 0.0, now())
        .unwrap();

    db.finish_timer(&user, TimerStatus::CheckedIn, now()).unwrap();
    let escalated = db
        .escalate_expired_timer(&timer.id, &Uuid::new_v4().to_string(), now())
        .unwrap();
    assert!(escalated.is_none());
    assert_eq!(db.get_timer_by_id(&timer.id).unwrap().unwrap().status, "CHECKED_IN");
    assert!(db.list_alerts(&user).unwrap().is_empty());
}

#[test]
fn timer_escalation_is_all_or_nothing() {
    let db = Database::open_in_memory().unwrap();
    let user = new_user(&db);
    add_contact(&db, &user, "Mom", 1, now());
    let timer = db
        .start_timer(&Uuid::new_v4().to_string(), &user, 1800, 6.8649, 79.9738, now())
        .unwrap();

    // Forcing the alert insert to collide rolls the whole escalation back:
    // the session stays RUNNING for the next pass instead of going EXPIRED
    // with no alert behind it.
    let taken = db
        .create_alert(&Uuid::new_v4().to_string(), &user, 0.0, 0.0, now())
        .unwrap();
    let deadline = now() + Duration::seconds(1800);
    let err = db.escalate_expired_timer(&timer.id, &taken.id, deadline).unwrap_err();
    assert!(matches!(err, StoreError::Sqlite(_)));
    assert_eq!(db.get_timer_by_id(&timer.id).unwrap().unwrap().status, "RUNNING");

    // The retried pass with a fresh alert id escalates cleanly.
    let queued = db
        .escalate_expired_timer(&timer.id, &Uuid::new_v4().to_string(), deadline)
        .unwrap();
    assert_eq!(queued, Some(1));
    assert_eq!(db.get_timer_by_id(&timer.id).unwrap().unwrap().status, "EXPIRED");
    assert_eq!(db.list_alerts(&user).unwrap().len(), 2);
}
