use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;

use aegis_db::models::ContactRow;
use aegis_db::queries::contacts::ContactUpdate;
use aegis_types::api::{Claims, ContactResponse, CreateContactRequest, UpdateContactRequest};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

pub async fn list_contacts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let rows = state.db.list_contacts(&claims.sub.to_string())?;
    let contacts: Vec<ContactResponse> = rows.into_iter().map(contact_response).collect();
    Ok(Json(contacts))
}

pub async fn create_contact(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateContactRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("name must not be empty".into()));
    }
    validate_phone(&req.phone)?;
    if let Some(email) = &req.email {
        validate_email(email)?;
    }
    let priority = validate_priority(req.priority.unwrap_or(1))?;

    let row = state.db.create_contact(
        &Uuid::new_v4().to_string(),
        &claims.sub.to_string(),
        name,
        &req.phone,
        req.email.as_deref(),
        priority,
        chrono::Utc::now(),
    )?;

    Ok((StatusCode::CREATED, Json(contact_response(row))))
}

pub async fn update_contact(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateContactRequest>,
) -> ApiResult<impl IntoResponse> {
    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            return Err(ApiError::Validation("name must not be empty".into()));
        }
    }
    if let Some(phone) = &req.phone {
        validate_phone(phone)?;
    }
    if let Some(Some(email)) = &req.email {
        validate_email(email)?;
    }
    let priority = match req.priority {
        Some(p) => Some(validate_priority(p)?),
        None => None,
    };

    let row = state.db.update_contact(
        &id.to_string(),
        &claims.sub.to_string(),
        ContactUpdate {
            name: req.name.map(|n| n.trim().to_string()),
            phone: req.phone,
            email: req.email,
            priority,
            is_active: req.is_active,
        },
    )?;

    Ok(Json(contact_response(row)))
}

pub async fn delete_contact(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    state
        .db
        .delete_contact(&id.to_string(), &claims.sub.to_string())?;
    Ok(StatusCode::NO_CONTENT)
}

/// Regional phone format: `+94XXXXXXXXX` or `0XXXXXXXXX`.
fn validate_phone(phone: &str) -> ApiResult<()> {
    let rest = phone
        .strip_prefix("+94")
        .or_else(|| phone.strip_prefix('0'));

    match rest {
        Some(digits) if digits.len() == 9 && digits.bytes().all(|b| b.is_ascii_digit()) => Ok(()),
        _ => Err(ApiError::Validation(
            "phone must be a valid number (e.g., +94771234567 or 0771234567)".into(),
        )),
    }
}

fn validate_email(email: &str) -> ApiResult<()> {
    if email.contains('@') && email.len() >= 3 {
        Ok(())
    } else {
        Err(ApiError::Validation("email is not valid".into()))
    }
}

fn validate_priority(priority: u8) -> ApiResult<i64> {
    if (1..=5).contains(&priority) {
        Ok(priority as i64)
    } else {
        Err(ApiError::Validation("priority must be between 1 and 5".into()))
    }
}

fn contact_response(row: ContactRow) -> ContactResponse {
    ContactResponse {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt contact id '{}': {}", row.id, e);
            Uuid::default()
        }),
        name: row.name,
        phone: row.phone,
        email: row.email,
        priority: row.priority.clamp(1, 5) as u8,
        is_active: row.is_active,
        created_at: aegis_db::parse_ts(&row.created_at),
    }
}
