use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::page_bounds;
use crate::{
    auth::StaffUser,
    db::lower,
    error::{AppError, AppResult},
    models::{Company, Posting, Priority},
    queue::{postings_with_companies, PostingRows},
    schema::{companies, postings},
    state::AppState,
    store::postings::{self as store, PostingChangeset, PostingDraft},
    utils::{
        json::{nullable_datetime, optional_bool, optional_string, optional_url_array},
        non_empty,
        time::{parse_datetime, to_rfc3339},
    },
    validation::{
        limit_text, normalize_posting_url, require_text, require_url, validate_url_array,
    },
};

#[derive(Deserialize, Default)]
pub struct PostingListQuery {
    /// Substring of company name, posting URL or notes.
    pub query: Option<String>,
    /// Exact company name, ignoring case.
    pub company: Option<String>,
    pub company_id: Option<Uuid>,
    pub in_jurisdiction: Option<bool>,
    pub priority: Option<Priority>,
    /// `true` for open postings only, `false` for closed ones.
    pub open: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Deserialize)]
pub struct PostingUrlQuery {
    pub url: String,
}

#[derive(Deserialize)]
pub struct PostingRequest {
    pub company_id: Uuid,
    pub url: String,
    #[serde(default)]
    pub job_board_urls: Value,
    pub title: String,
    pub closed: Option<String>,
    #[serde(default)]
    pub closed_note: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub in_jurisdiction: bool,
    #[serde(default)]
    pub jurisdiction: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Deserialize, Default)]
pub struct ClosePostingRequest {
    pub note: Option<String>,
}

#[derive(Serialize)]
pub struct PostingCompany {
    pub id: Uuid,
    pub name: String,
    pub priority: Priority,
}

#[derive(Serialize)]
pub struct PostingResponse {
    pub id: Uuid,
    pub company_id: Uuid,
    pub url: String,
    pub job_board_urls: Vec<String>,
    pub title: String,
    pub closed: Option<String>,
    pub closed_note: String,
    pub location: String,
    pub in_jurisdiction: bool,
    pub jurisdiction: String,
    pub notes: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<PostingCompany>,
}

impl From<Posting> for PostingResponse {
    fn from(posting: Posting) -> Self {
        Self {
            id: posting.id,
            company_id: posting.company_id,
            url: posting.url,
            job_board_urls: posting.job_board_urls,
            title: posting.title,
            closed: posting.closed.map(to_rfc3339),
            closed_note: posting.closed_note,
            location: posting.location,
            in_jurisdiction: posting.in_jurisdiction,
            jurisdiction: posting.jurisdiction,
            notes: posting.notes,
            created_at: to_rfc3339(posting.created_at),
            updated_at: to_rfc3339(posting.updated_at),
            company: None,
        }
    }
}

impl PostingResponse {
    pub fn with_company(posting: Posting, company: Company) -> Self {
        Self {
            company: Some(PostingCompany {
                priority: company.priority(),
                id: company.id,
                name: company.name,
            }),
            ..Self::from(posting)
        }
    }
}

fn filtered_postings<'a>(params: &PostingListQuery) -> PostingRows<'a> {
    let mut query = postings_with_companies();
    if let Some(search) = non_empty(params.query.as_deref()) {
        let pattern = format!("%{search}%");
        query = query.filter(
            companies::name
                .ilike(pattern.clone())
                .or(postings::url.ilike(pattern.clone()))
                .or(postings::title.ilike(pattern.clone()))
                .or(postings::notes.ilike(pattern)),
        );
    }
    if let Some(company) = non_empty(params.company.as_deref()) {
        query = query.filter(lower(companies::name).eq(company.to_lowercase()));
    }
    if let Some(company_id) = params.company_id {
        query = query.filter(postings::company_id.eq(company_id));
    }
    if let Some(in_jurisdiction) = params.in_jurisdiction {
        query = query.filter(postings::in_jurisdiction.eq(in_jurisdiction));
    }
    if let Some(priority) = params.priority {
        query = query.filter(companies::priority.eq(priority.as_i32()));
    }
    match params.open {
        Some(true) => query = query.filter(postings::closed.is_null()),
        Some(false) => query = query.filter(postings::closed.is_not_null()),
        None => {}
    }
    query
}

pub async fn list_postings(
    State(state): State<AppState>,
    Query(params): Query<PostingListQuery>,
) -> AppResult<Json<Vec<PostingResponse>>> {
    let mut conn = state.db()?;
    let (limit, offset) = page_bounds(params.limit, params.offset);

    let rows: Vec<(Posting, Company)> = filtered_postings(&params)
        .order((
            lower(companies::name).asc(),
            postings::created_at.desc(),
            postings::id.asc(),
        ))
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|(posting, company)| PostingResponse::with_company(posting, company))
            .collect(),
    ))
}

pub async fn get_posting(
    State(state): State<AppState>,
    Path(posting_id): Path<Uuid>,
) -> AppResult<Json<PostingResponse>> {
    let mut conn = state.db()?;
    let (posting, company): (Posting, Company) = postings_with_companies()
        .filter(postings::id.eq(posting_id))
        .first(&mut conn)?;
    Ok(Json(PostingResponse::with_company(posting, company)))
}

/// Postings whose canonical or job board URL equals `url`. The URL is
/// normalized first, and the raw value is tried as well.
pub async fn get_postings_by_url(
    State(state): State<AppState>,
    Query(params): Query<PostingUrlQuery>,
) -> AppResult<Json<Vec<PostingResponse>>> {
    let raw = params.url.trim();
    if raw.is_empty() {
        return Err(AppError::bad_request("url must not be empty"));
    }

    let mut conn = state.db()?;
    let normalized = normalize_posting_url(raw);
    let mut matches = store::find_by_url(&mut conn, &normalized)?;
    if matches.is_empty() && normalized != raw {
        matches = store::find_by_url(&mut conn, raw)?;
    }
    Ok(Json(matches.into_iter().map(PostingResponse::from).collect()))
}

pub async fn create_posting(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Json(payload): Json<PostingRequest>,
) -> AppResult<(StatusCode, Json<PostingResponse>)> {
    let closed = parse_datetime(payload.closed.as_deref().unwrap_or_default())
        .map_err(AppError::bad_request)?;
    let draft = PostingDraft {
        company_id: payload.company_id,
        url: payload.url,
        job_board_urls: validate_url_array(&payload.job_board_urls)?,
        title: payload.title,
        closed,
        closed_note: payload.closed_note,
        location: payload.location,
        in_jurisdiction: payload.in_jurisdiction,
        jurisdiction: payload.jurisdiction,
        notes: payload.notes,
    };
    let new_posting = draft.validate()?;

    let mut conn = state.db()?;
    let posting = store::create_posting(&mut conn, &new_posting)?;
    info!(posting_id = %posting.id, user_id = %user.user_id, "created posting");
    Ok((StatusCode::CREATED, Json(posting.into())))
}

pub async fn update_posting(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Path(posting_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<PostingResponse>> {
    let text = |field: &'static str, max: usize| -> AppResult<Option<String>> {
        optional_string(&body, field)
            .map_err(AppError::bad_request)?
            .map(|value| limit_text(field, value.trim(), max))
            .transpose()
            .map_err(AppError::from)
    };

    let company_id = match optional_string(&body, "company_id").map_err(AppError::bad_request)? {
        Some(value) => Some(
            Uuid::parse_str(value.trim())
                .map_err(|_| AppError::bad_request("company_id must be a UUID"))?,
        ),
        None => None,
    };

    let job_board_urls = optional_url_array(&body, "job_board_urls")
        .map_err(AppError::bad_request)?
        .map(|urls| {
            urls.iter()
                .map(|url| normalize_posting_url(url))
                .collect::<Vec<_>>()
        });

    let changes = PostingChangeset {
        company_id,
        url: optional_string(&body, "url")
            .map_err(AppError::bad_request)?
            .map(|value| require_url("url", &normalize_posting_url(&value)))
            .transpose()?,
        job_board_urls,
        title: optional_string(&body, "title")
            .map_err(AppError::bad_request)?
            .map(|value| require_text("title", &value, 500))
            .transpose()?,
        closed: nullable_datetime(&body, "closed").map_err(AppError::bad_request)?,
        closed_note: text("closed_note", 1000)?,
        location: text("location", 500)?,
        in_jurisdiction: optional_bool(&body, "in_jurisdiction").map_err(AppError::bad_request)?,
        jurisdiction: text("jurisdiction", 2000)?,
        notes: optional_string(&body, "notes").map_err(AppError::bad_request)?,
    };

    let mut conn = state.db()?;
    let posting = store::update_posting(&mut conn, posting_id, &changes)?;
    info!(posting_id = %posting.id, user_id = %user.user_id, "updated posting");
    Ok(Json(posting.into()))
}

pub async fn close_posting(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Path(posting_id): Path<Uuid>,
    payload: Option<Json<ClosePostingRequest>>,
) -> AppResult<Json<PostingResponse>> {
    let note = payload.and_then(|Json(request)| request.note);
    let mut conn = state.db()?;
    let posting = store::close_posting(&mut conn, posting_id, note.as_deref())?;
    info!(posting_id = %posting.id, user_id = %user.user_id, "closed posting");
    Ok(Json(posting.into()))
}

pub async fn delete_posting(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Path(posting_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    store::delete_posting(&mut conn, posting_id)?;
    info!(posting_id = %posting_id, user_id = %user.user_id, "deleted posting");
    Ok(StatusCode::NO_CONTENT)
}
