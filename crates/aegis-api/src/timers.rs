use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{info, warn};
use uuid::Uuid;

use aegis_db::models::TimerRow;
use aegis_types::api::{Claims, StartTimerRequest, TimerResponse};
use aegis_types::models::TimerStatus;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// Accepted countdown range: one minute to one day.
const MIN_DURATION_SECS: u32 = 60;
const MAX_DURATION_SECS: u32 = 86_400;

/// Start a countdown. An already-RUNNING session for this user is cancelled
/// and replaced in the same transaction.
pub async fn start_timer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StartTimerRequest>,
) -> ApiResult<impl IntoResponse> {
    if !(MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&req.duration_seconds) {
        return Err(ApiError::Validation(format!(
            "duration_seconds must be between {} and {}",
            MIN_DURATION_SECS, MAX_DURATION_SECS
        )));
    }

    let row = state.db.start_timer(
        &Uuid::new_v4().to_string(),
        &claims.sub.to_string(),
        req.duration_seconds as i64,
        req.latitude,
        req.longitude,
        chrono::Utc::now(),
    )?;

    info!(
        "Safety timer {} started for {} ({}s)",
        row.id, claims.email, row.duration_seconds
    );

    Ok((StatusCode::CREATED, Json(timer_response(row))))
}

pub async fn current_timer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let row = state
        .db
        .running_timer(&claims.sub.to_string())?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(timer_response(row)))
}

/// "I'm safe": terminal CHECKED_IN, no escalation.
pub async fn check_in(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let row = state.db.finish_timer(
        &claims.sub.to_string(),
        TimerStatus::CheckedIn,
        chrono::Utc::now(),
    )?;
    info!("Safety timer {} checked in by {}", row.id, claims.email);
    Ok(Json(timer_response(row)))
}

pub async fn cancel_timer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let row = state.db.finish_timer(
        &claims.sub.to_string(),
        TimerStatus::Cancelled,
        chrono::Utc::now(),
    )?;
    info!("Safety timer {} cancelled by {}", row.id, claims.email);
    Ok(Json(timer_response(row)))
}

fn timer_response(row: TimerRow) -> TimerResponse {
    TimerResponse {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt timer id '{}': {}", row.id, e);
            Uuid::default()
        }),
        duration_seconds: row.duration_seconds.max(0) as u32,
        status: row.status.parse().unwrap_or(TimerStatus::Running),
        started_at: aegis_db::parse_ts(&row.started_at),
        expires_at: aegis_db::parse_ts(&row.expires_at),
    }
}
