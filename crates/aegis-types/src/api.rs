use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AlertStatus, AttemptStatus, Channel, DeliverySummary, TimerStatus};

// -- JWT Claims --

/// JWT claims shared between token issuance (signup/signin handlers) and the
/// bearer middleware. Canonical definition lives here in aegis-types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub full_name: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Serialize)]
pub struct SignUpResponse {
    pub message: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub access_token: String,
    pub user: UserResponse,
}

/// User projection returned to clients. Never includes the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
}

// -- Trusted contacts --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateContactRequest {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub priority: Option<u8>,
}

/// Partial update. `email` is double-wrapped so the body can distinguish
/// "leave as is" (field omitted) from "clear it" (`"email": null`).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateContactRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<Option<String>>,
    pub priority: Option<u8>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactResponse {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub priority: u8,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

// -- Panic alerts --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerAlertRequest {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAlertStatusRequest {
    pub status: AlertStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AlertResponse {
    pub id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub status: AlertStatus,
    pub notes: Option<String>,
    pub delivery: DeliverySummary,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// One delivery attempt as shown in the alert detail view. Contact fields are
/// the snapshot taken at fan-out time, so history survives contact deletion.
#[derive(Debug, Serialize)]
pub struct AttemptResponse {
    pub contact_name: String,
    pub contact_phone: String,
    pub channel: Channel,
    pub status: AttemptStatus,
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AlertDetailResponse {
    #[serde(flatten)]
    pub alert: AlertResponse,
    pub attempts: Vec<AttemptResponse>,
}

// -- Safety timer --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartTimerRequest {
    pub duration_seconds: u32,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize)]
pub struct TimerResponse {
    pub id: Uuid,
    pub duration_seconds: u32,
    pub status: TimerStatus,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
