use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use serde::Deserialize;
use tracing::info;

use super::{
    applications::{load_applications, ApplicationListQuery, ApplicationResponse},
    page_bounds,
    profile::UserResponse,
};
use crate::{
    auth::StaffUser,
    error::{AppError, AppResult},
    models::{User, ROLE_ADMIN, ROLE_USER},
    schema::users,
    state::AppState,
    store::users::create_user,
    validation::require_text,
};

#[derive(Deserialize, Default)]
pub struct UserListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub role: Option<String>,
}

pub async fn list_users(
    State(state): State<AppState>,
    _staff: StaffUser,
    Query(params): Query<UserListQuery>,
) -> AppResult<Json<Vec<UserResponse>>> {
    let (limit, offset) = page_bounds(params.limit, params.offset);
    let mut conn = state.db()?;
    let rows: Vec<User> = users::table
        .order(users::username.asc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;
    Ok(Json(rows.into_iter().map(UserResponse::from).collect()))
}

pub async fn create_account(
    State(state): State<AppState>,
    StaffUser(staff): StaffUser,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let username = require_text("username", &payload.username, 150)?;
    if payload.password.len() < 8 {
        return Err(AppError::bad_request(
            "password must be at least 8 characters",
        ));
    }
    let role = payload
        .role
        .as_deref()
        .map(str::trim)
        .unwrap_or(ROLE_USER);
    if role != ROLE_USER && role != ROLE_ADMIN {
        return Err(AppError::bad_request(format!("invalid role '{role}'")));
    }

    let mut conn = state.db()?;
    let user = create_user(&mut conn, &username, &payload.password, role)?;
    info!(user_id = %user.id, created_by = %staff.user_id, role, "created user");
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Applications across every user; `username` narrows to one.
pub async fn list_all_applications(
    State(state): State<AppState>,
    _staff: StaffUser,
    Query(params): Query<ApplicationListQuery>,
) -> AppResult<Json<Vec<ApplicationResponse>>> {
    let mut conn = state.db()?;
    Ok(Json(load_applications(&mut conn, None, &params)?))
}
