use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::{api_key::create_api_key, AuthenticatedUser},
    error::{AppError, AppResult},
    models::{ApiKey, User},
    schema::api_keys,
    state::AppState,
    store::users::{self as store, ProfileChangeset},
    utils::{json::optional_string, time::to_rfc3339},
    validation::{is_valid_url, limit_text},
};

#[derive(Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub role: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub linkedin: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            phone: user.phone,
            linkedin: user.linkedin,
            created_at: to_rfc3339(user.created_at),
        }
    }
}

#[derive(Deserialize, Default)]
pub struct CreateApiKeyRequest {
    #[serde(default)]
    pub comment: String,
}

#[derive(Serialize)]
pub struct ApiKeyResponse {
    pub key: String,
    pub comment: String,
    pub created_at: String,
}

impl From<ApiKey> for ApiKeyResponse {
    fn from(api_key: ApiKey) -> Self {
        Self {
            key: api_key.key,
            comment: api_key.comment,
            created_at: to_rfc3339(api_key.created_at),
        }
    }
}

pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<UserResponse>> {
    let mut conn = state.db()?;
    let profile = store::find(&mut conn, user.user_id)?;
    Ok(Json(profile.into()))
}

pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<Value>,
) -> AppResult<Json<UserResponse>> {
    let text = |field: &'static str, max: usize| -> AppResult<Option<String>> {
        optional_string(&body, field)
            .map_err(AppError::bad_request)?
            .map(|value| limit_text(field, value.trim(), max))
            .transpose()
            .map_err(AppError::from)
    };

    let email = text("email", 254)?;
    if email
        .as_deref()
        .is_some_and(|value| !value.is_empty() && !value.contains('@'))
    {
        return Err(AppError::bad_request("email must be a valid address"));
    }

    let linkedin = text("linkedin", 2048)?;
    if linkedin
        .as_deref()
        .is_some_and(|value| !value.is_empty() && !is_valid_url(value))
    {
        return Err(AppError::bad_request("linkedin must be a valid URL"));
    }

    let changes = ProfileChangeset {
        first_name: text("first_name", 150)?,
        last_name: text("last_name", 150)?,
        email,
        phone: text("phone", 10)?,
        linkedin,
    };

    let mut conn = state.db()?;
    let profile = store::update_profile(&mut conn, user.user_id, &changes)?;
    info!(user_id = %user.user_id, "updated profile");
    Ok(Json(profile.into()))
}

pub async fn list_api_keys(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<ApiKeyResponse>>> {
    let mut conn = state.db()?;
    let keys: Vec<ApiKey> = api_keys::table
        .filter(api_keys::user_id.eq(user.user_id))
        .order(api_keys::created_at.asc())
        .load(&mut conn)?;
    Ok(Json(keys.into_iter().map(ApiKeyResponse::from).collect()))
}

pub async fn create_key(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Option<Json<CreateApiKeyRequest>>,
) -> AppResult<(StatusCode, Json<ApiKeyResponse>)> {
    let comment = payload
        .map(|Json(request)| request.comment)
        .unwrap_or_default();
    let comment = limit_text("comment", comment.trim(), 250)?;

    let mut conn = state.db()?;
    let api_key = create_api_key(&mut conn, user.user_id, None, &comment)?;
    info!(user_id = %user.user_id, "created API key");
    Ok((StatusCode::CREATED, Json(api_key.into())))
}

pub async fn revoke_api_key(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(key): Path<String>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    let deleted = diesel::delete(
        api_keys::table
            .filter(api_keys::key.eq(&key))
            .filter(api_keys::user_id.eq(user.user_id)),
    )
    .execute(&mut conn)?;

    if deleted == 0 {
        return Err(AppError::not_found());
    }
    info!(user_id = %user.user_id, "revoked API key");
    Ok(StatusCode::NO_CONTENT)
}
