use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

use crate::{
    auth::{AuthenticatedUser, StaffUser},
    error::AppResult,
    state::AppState,
    transfer::{self, ImportSummary},
};

fn csv_download(filename: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}

pub async fn export_my_applications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Response> {
    let mut conn = state.db()?;
    let body = transfer::export_applications(&mut conn, Some(user.user_id))?;
    Ok(csv_download("applications.csv", body))
}

pub async fn import_my_applications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: String,
) -> AppResult<Json<ImportSummary>> {
    let mut conn = state.db()?;
    let summary = transfer::import_applications(&mut conn, body.as_bytes(), Some(user.user_id))?;
    info!(user_id = %user.user_id, created = summary.created, updated = summary.updated, "imported own applications");
    Ok(Json(summary))
}

pub async fn export_companies(
    State(state): State<AppState>,
    _staff: StaffUser,
) -> AppResult<Response> {
    let mut conn = state.db()?;
    Ok(csv_download(
        "companies.csv",
        transfer::export_companies(&mut conn)?,
    ))
}

pub async fn export_postings(
    State(state): State<AppState>,
    _staff: StaffUser,
) -> AppResult<Response> {
    let mut conn = state.db()?;
    Ok(csv_download("postings.csv", transfer::export_postings(&mut conn)?))
}

pub async fn export_applications(
    State(state): State<AppState>,
    _staff: StaffUser,
) -> AppResult<Response> {
    let mut conn = state.db()?;
    Ok(csv_download(
        "applications.csv",
        transfer::export_applications(&mut conn, None)?,
    ))
}

pub async fn export_users(
    State(state): State<AppState>,
    _staff: StaffUser,
) -> AppResult<Response> {
    let mut conn = state.db()?;
    Ok(csv_download("users.csv", transfer::export_users(&mut conn)?))
}

pub async fn import_companies(
    State(state): State<AppState>,
    _staff: StaffUser,
    body: String,
) -> AppResult<Json<ImportSummary>> {
    let mut conn = state.db()?;
    Ok(Json(transfer::import_companies(&mut conn, body.as_bytes())?))
}

pub async fn import_postings(
    State(state): State<AppState>,
    _staff: StaffUser,
    body: String,
) -> AppResult<Json<ImportSummary>> {
    let mut conn = state.db()?;
    Ok(Json(transfer::import_postings(&mut conn, body.as_bytes())?))
}

pub async fn import_applications(
    State(state): State<AppState>,
    _staff: StaffUser,
    body: String,
) -> AppResult<Json<ImportSummary>> {
    let mut conn = state.db()?;
    Ok(Json(transfer::import_applications(
        &mut conn,
        body.as_bytes(),
        None,
    )?))
}
