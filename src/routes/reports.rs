use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::AppResult,
    reports::{self, CompanyCounts, CompanyLeaderboardEntry, UserCompanyCount, UserLeaderboardEntry},
    state::AppState,
};

#[derive(Serialize)]
pub struct CompletionResponse {
    pub company_id: Uuid,
    pub completion_percentage: f64,
}

pub async fn company_counts(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<CompanyCounts>>> {
    let mut conn = state.db()?;
    Ok(Json(reports::company_counts(&mut conn)?))
}

pub async fn company_completion(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
) -> AppResult<Json<CompletionResponse>> {
    let mut conn = state.db()?;
    let completion_percentage = reports::completion_for_company(&mut conn, company_id)?;
    Ok(Json(CompletionResponse {
        company_id,
        completion_percentage,
    }))
}

pub async fn user_leaderboard(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<UserLeaderboardEntry>>> {
    let mut conn = state.db()?;
    Ok(Json(reports::user_application_leaderboard(&mut conn)?))
}

pub async fn company_leaderboard(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<CompanyLeaderboardEntry>>> {
    let mut conn = state.db()?;
    Ok(Json(reports::company_application_leaderboard(&mut conn)?))
}

pub async fn my_companies(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<UserCompanyCount>>> {
    let mut conn = state.db()?;
    Ok(Json(reports::user_application_companies(
        &mut conn,
        user.user_id,
    )?))
}
