use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use diesel::{pg::PgConnection, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::{page_bounds, postings::PostingResponse};
use crate::{
    auth::AuthenticatedUser,
    db::lower,
    error::{AppError, AppResult},
    models::{Application, BonaFide, Company, Posting},
    schema::{applications, companies, postings, users},
    state::AppState,
    store::{
        applications::{
            self as store, ApplicationChangeset, ApplicationDraft, MarkAppliedSummary,
        },
        postings::find_by_url,
    },
    utils::{
        json::{classify_nullable, nullable_datetime, optional_string, NullableValue},
        non_empty,
        time::{parse_datetime, to_rfc3339},
    },
    validation::normalize_posting_url,
};

#[derive(Deserialize, Default)]
pub struct ApplicationListQuery {
    /// Substring of company name, posting URL or notes.
    pub query: Option<String>,
    /// Exact company name, ignoring case.
    pub company: Option<String>,
    pub in_jurisdiction: Option<bool>,
    /// `true` for reported applications only, `false` for unreported ones.
    pub reported: Option<bool>,
    pub bona_fide: Option<BonaFide>,
    /// Staff listing only: restrict to one user.
    pub username: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Deserialize)]
pub struct ApplicationUrlQuery {
    pub url: String,
}

#[derive(Deserialize)]
pub struct CreateApplicationRequest {
    pub posting_id: Uuid,
    pub bona_fide: Option<BonaFide>,
    pub applied: Option<String>,
    pub reported: Option<String>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Deserialize)]
pub struct MarkAppliedRequest {
    pub posting_ids: Vec<Uuid>,
}

#[derive(Serialize)]
pub struct ApplicationResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub posting_id: Uuid,
    pub bona_fide: Option<BonaFide>,
    pub applied: String,
    pub reported: Option<String>,
    pub notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posting: Option<PostingResponse>,
}

impl From<Application> for ApplicationResponse {
    fn from(application: Application) -> Self {
        Self {
            bona_fide: application.bona_fide(),
            id: application.id,
            user_id: application.user_id,
            posting_id: application.posting_id,
            applied: to_rfc3339(application.applied),
            reported: application.reported.map(to_rfc3339),
            notes: application.notes,
            username: None,
            posting: None,
        }
    }
}

/// Applications joined with their posting and company, newest first. With
/// `owner` set only that user's rows are visible.
pub(crate) fn load_applications(
    conn: &mut PgConnection,
    owner: Option<Uuid>,
    params: &ApplicationListQuery,
) -> AppResult<Vec<ApplicationResponse>> {
    let (limit, offset) = page_bounds(params.limit, params.offset);

    let mut query = applications::table
        .inner_join(postings::table.inner_join(companies::table))
        .inner_join(users::table)
        .select((
            applications::all_columns,
            postings::all_columns,
            companies::all_columns,
            users::username,
        ))
        .into_boxed();

    if let Some(user_id) = owner {
        query = query.filter(applications::user_id.eq(user_id));
    } else if let Some(username) = non_empty(params.username.as_deref()) {
        query = query.filter(users::username.eq(username.to_string()));
    }
    if let Some(search) = non_empty(params.query.as_deref()) {
        let pattern = format!("%{search}%");
        query = query.filter(
            companies::name
                .ilike(pattern.clone())
                .or(postings::url.ilike(pattern.clone()))
                .or(postings::title.ilike(pattern.clone()))
                .or(applications::notes.ilike(pattern)),
        );
    }
    if let Some(company) = non_empty(params.company.as_deref()) {
        query = query.filter(lower(companies::name).eq(company.to_lowercase()));
    }
    if let Some(in_jurisdiction) = params.in_jurisdiction {
        query = query.filter(postings::in_jurisdiction.eq(in_jurisdiction));
    }
    match params.reported {
        Some(true) => query = query.filter(applications::reported.is_not_null()),
        Some(false) => query = query.filter(applications::reported.is_null()),
        None => {}
    }
    if let Some(bona_fide) = params.bona_fide {
        query = query.filter(applications::bona_fide.eq(bona_fide.as_i32()));
    }

    let rows: Vec<(Application, Posting, Company, String)> = query
        .order((applications::applied.desc(), applications::id.asc()))
        .limit(limit)
        .offset(offset)
        .load(conn)?;

    Ok(rows
        .into_iter()
        .map(|(application, posting, company, username)| ApplicationResponse {
            username: Some(username),
            posting: Some(PostingResponse::with_company(posting, company)),
            ..ApplicationResponse::from(application)
        })
        .collect())
}

pub async fn list_applications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<ApplicationListQuery>,
) -> AppResult<Json<Vec<ApplicationResponse>>> {
    let mut conn = state.db()?;
    let applications = load_applications(&mut conn, Some(user.user_id), &params)?;
    Ok(Json(applications))
}

pub async fn get_application(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(application_id): Path<Uuid>,
) -> AppResult<Json<ApplicationResponse>> {
    let mut conn = state.db()?;
    let application = store::find_for_user(&mut conn, user.user_id, application_id)?;
    Ok(Json(application.into()))
}

/// The caller's applications to any posting listed under `url`.
pub async fn get_applications_by_url(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<ApplicationUrlQuery>,
) -> AppResult<Json<Vec<ApplicationResponse>>> {
    let raw = params.url.trim();
    if raw.is_empty() {
        return Err(AppError::bad_request("url must not be empty"));
    }

    let mut conn = state.db()?;
    let normalized = normalize_posting_url(raw);
    let mut matches = find_by_url(&mut conn, &normalized)?;
    if matches.is_empty() && normalized != raw {
        matches = find_by_url(&mut conn, raw)?;
    }
    let posting_ids: Vec<Uuid> = matches.iter().map(|posting| posting.id).collect();

    let rows: Vec<Application> = applications::table
        .filter(applications::user_id.eq(user.user_id))
        .filter(applications::posting_id.eq_any(posting_ids))
        .order(applications::applied.desc())
        .load(&mut conn)?;
    Ok(Json(rows.into_iter().map(ApplicationResponse::from).collect()))
}

pub async fn create_application(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateApplicationRequest>,
) -> AppResult<(StatusCode, Json<ApplicationResponse>)> {
    let applied = parse_datetime(payload.applied.as_deref().unwrap_or_default())
        .map_err(AppError::bad_request)?;
    let reported = parse_datetime(payload.reported.as_deref().unwrap_or_default())
        .map_err(AppError::bad_request)?;

    let mut conn = state.db()?;
    crate::store::postings::find(&mut conn, payload.posting_id)
        .optional()?
        .ok_or_else(|| AppError::bad_request("posting does not exist"))?;

    let application = store::create_application(
        &mut conn,
        ApplicationDraft {
            user_id: user.user_id,
            posting_id: payload.posting_id,
            bona_fide: payload.bona_fide.map(BonaFide::as_i32),
            applied,
            reported,
            notes: payload.notes,
        },
    )?;
    info!(
        application_id = %application.id,
        posting_id = %application.posting_id,
        user_id = %user.user_id,
        "created application"
    );
    Ok((StatusCode::CREATED, Json(application.into())))
}

pub async fn update_application(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(application_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<ApplicationResponse>> {
    let posting_id = match optional_string(&body, "posting_id").map_err(AppError::bad_request)? {
        Some(value) => Some(
            Uuid::parse_str(value.trim())
                .map_err(|_| AppError::bad_request("posting_id must be a UUID"))?,
        ),
        None => None,
    };

    let bona_fide = match classify_nullable(body.get("bona_fide")).map_err(AppError::bad_request)? {
        NullableValue::Omitted => None,
        NullableValue::Null => Some(None),
        NullableValue::String(value) => Some(Some(
            BonaFide::parse(&value)
                .ok_or_else(|| AppError::bad_request(format!("invalid bona_fide '{value}'")))?
                .as_i32(),
        )),
    };

    let applied = match nullable_datetime(&body, "applied").map_err(AppError::bad_request)? {
        None => None,
        Some(None) => return Err(AppError::bad_request("applied cannot be null")),
        Some(Some(value)) => Some(value),
    };

    let changes = ApplicationChangeset {
        posting_id,
        bona_fide,
        applied,
        reported: nullable_datetime(&body, "reported").map_err(AppError::bad_request)?,
        notes: optional_string(&body, "notes").map_err(AppError::bad_request)?,
    };

    let mut conn = state.db()?;
    let application = store::update_application(&mut conn, user.user_id, application_id, &changes)?;
    info!(application_id = %application.id, user_id = %user.user_id, "updated application");
    Ok(Json(application.into()))
}

pub async fn delete_application(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(application_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    store::delete_application(&mut conn, user.user_id, application_id)?;
    info!(application_id = %application_id, user_id = %user.user_id, "deleted application");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_applied(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<MarkAppliedRequest>,
) -> AppResult<Json<MarkAppliedSummary>> {
    let mut conn = state.db()?;
    let summary = store::mark_applied(&mut conn, user.user_id, &payload.posting_ids)?;
    Ok(Json(summary))
}
