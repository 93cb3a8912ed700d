use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use aegis_db::Database;
use aegis_types::api::{
    Claims, SignInRequest, SignInResponse, SignUpRequest, SignUpResponse, UserResponse,
};

use crate::error::{ApiError, ApiResult};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = req.email.trim().to_lowercase();
    if !email.contains('@') || email.len() < 3 {
        return Err(ApiError::Validation("email is not valid".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }
    if req.full_name.trim().is_empty() {
        return Err(ApiError::Validation("full_name must not be empty".into()));
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .to_string();

    let user_id = Uuid::new_v4();
    state
        .db
        .create_user(&user_id.to_string(), &email, &password_hash, req.full_name.trim())?;

    Ok((
        StatusCode::CREATED,
        Json(SignUpResponse {
            message: "User created successfully".into(),
            user: UserResponse {
                id: user_id,
                email,
                full_name: req.full_name.trim().to_string(),
            },
        }),
    ))
}

pub async fn signin(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = req.email.trim().to_lowercase();

    let user = state
        .db
        .get_user_by_email(&email)?
        .ok_or(ApiError::Unauthorized)?;

    let parsed_hash =
        PasswordHash::new(&user.password).map_err(|e| ApiError::Internal(e.to_string()))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|_| ApiError::Internal(format!("corrupt user id {}", user.id)))?;

    let access_token = create_token(&state.jwt_secret, user_id, &user.email, &user.full_name)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(SignInResponse {
        access_token,
        user: UserResponse {
            id: user_id,
            email: user.email,
            full_name: user.full_name,
        },
    }))
}

fn create_token(secret: &str, user_id: Uuid, email: &str, full_name: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        full_name: full_name.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
