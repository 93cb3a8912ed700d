use std::str::FromStr;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use aegis_db::models::{AlertRow, AttemptRow};
use aegis_types::api::{
    AlertDetailResponse, AlertResponse, AttemptResponse, Claims, TriggerAlertRequest,
    UpdateAlertStatusRequest,
};
use aegis_types::models::{AlertStatus, AttemptStatus, Channel, DeliverySummary};

use crate::auth::AppState;
use crate::error::ApiResult;

/// Panic button: create an ACTIVE alert and queue the notification fan-out.
/// Delivery failures never block alert creation; the dispatcher handles
/// them asynchronously.
pub async fn trigger_alert(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<TriggerAlertRequest>,
) -> ApiResult<impl IntoResponse> {
    let user_id = claims.sub.to_string();
    let now = chrono::Utc::now();

    let alert = state.db.create_alert(
        &Uuid::new_v4().to_string(),
        &user_id,
        req.latitude,
        req.longitude,
        now,
    )?;

    let queued = state.db.fan_out(&alert.id, &user_id, now)?;
    info!(
        "Panic alert {} triggered by {} ({} notification attempt(s) queued)",
        alert.id, claims.email, queued
    );

    let attempts = state.db.attempts_for_alert(&alert.id)?;
    Ok((StatusCode::CREATED, Json(detail_response(alert, attempts))))
}

pub async fn list_alerts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let rows = state.db.list_alerts(&claims.sub.to_string())?;

    let mut alerts = Vec::with_capacity(rows.len());
    for row in rows {
        let attempts = state.db.attempts_for_alert(&row.id)?;
        alerts.push(alert_response(row, &attempts));
    }
    Ok(Json(alerts))
}

pub async fn get_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let alert = state
        .db
        .get_alert(&id.to_string(), &claims.sub.to_string())?;
    let attempts = state.db.attempts_for_alert(&alert.id)?;
    Ok(Json(detail_response(alert, attempts)))
}

/// Owner-only lifecycle transition: ACTIVE -> RESOLVED | FALSE_ALARM.
pub async fn update_alert_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateAlertStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    let alert = state.db.transition_alert(
        &id.to_string(),
        &claims.sub.to_string(),
        req.status,
        req.notes.as_deref(),
        chrono::Utc::now(),
    )?;

    info!("Alert {} transitioned to {}", alert.id, alert.status);

    let attempts = state.db.attempts_for_alert(&alert.id)?;
    Ok(Json(alert_response(alert, &attempts)))
}

fn alert_response(row: AlertRow, attempts: &[AttemptRow]) -> AlertResponse {
    let delivery = DeliverySummary::from_attempts(
        attempts
            .iter()
            .filter_map(|a| AttemptStatus::from_str(&a.status).ok()),
    );

    AlertResponse {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt alert id '{}': {}", row.id, e);
            Uuid::default()
        }),
        latitude: row.latitude,
        longitude: row.longitude,
        status: row.status.parse().unwrap_or_else(|e| {
            warn!("Corrupt alert status on '{}': {}", row.id, e);
            AlertStatus::Active
        }),
        notes: row.notes,
        delivery,
        created_at: aegis_db::parse_ts(&row.created_at),
        resolved_at: row.resolved_at.as_deref().map(aegis_db::parse_ts),
    }
}

fn detail_response(row: AlertRow, attempts: Vec<AttemptRow>) -> AlertDetailResponse {
    let alert = alert_response(row, &attempts);
    let attempts = attempts
        .into_iter()
        .map(|a| AttemptResponse {
            contact_name: a.contact_name,
            contact_phone: a.contact_phone,
            channel: a.channel.parse().unwrap_or(Channel::Sms),
            status: a.status.parse().unwrap_or(AttemptStatus::Pending),
            attempt_count: a.attempt_count.max(0) as u32,
            last_attempt_at: a.last_attempt_at.as_deref().map(aegis_db::parse_ts),
            failure_reason: a.failure_reason,
        })
        .collect();

    AlertDetailResponse { alert, attempts }
}
