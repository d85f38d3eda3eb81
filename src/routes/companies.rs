use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use diesel::{dsl::count, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::page_bounds;
use crate::{
    auth::StaffUser,
    db::lower,
    error::{AppError, AppResult},
    models::{Company, Priority},
    schema::{companies, postings},
    state::AppState,
    store::companies::{self as store, CompanyChangeset, CompanyDraft},
    utils::{
        json::{nullable_datetime, optional_string, optional_url_array},
        non_empty,
        time::{parse_datetime, to_rfc3339},
    },
    validation::{limit_text, require_text, require_url, validate_url_array},
};

#[derive(Deserialize, Default)]
pub struct CompanyListQuery {
    /// Substring of name, URL or notes, or an exact company id.
    pub query: Option<String>,
    /// Exact name, ignoring case.
    pub name: Option<String>,
    pub priority: Option<Priority>,
    /// `name` (default) or `postings` for most postings first.
    pub order: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Deserialize)]
pub struct CompanyNameQuery {
    pub name: String,
}

#[derive(Deserialize)]
pub struct CompanyRequest {
    pub name: String,
    #[serde(default)]
    pub hq: String,
    pub url: String,
    pub careers_url: String,
    #[serde(default)]
    pub careers_urls: Value,
    #[serde(default)]
    pub employees_est: String,
    #[serde(default)]
    pub employees_est_source: String,
    #[serde(default)]
    pub how_found: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub notes: String,
    pub filed: Option<String>,
}

#[derive(Serialize)]
pub struct CompanyResponse {
    pub id: Uuid,
    pub name: String,
    pub hq: String,
    pub url: String,
    pub careers_url: String,
    pub careers_urls: Vec<String>,
    pub employees_est: String,
    pub employees_est_source: String,
    pub how_found: String,
    pub priority: Priority,
    pub notes: String,
    pub filed: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posting_count: Option<i64>,
}

impl From<Company> for CompanyResponse {
    fn from(company: Company) -> Self {
        Self {
            priority: company.priority(),
            id: company.id,
            name: company.name,
            hq: company.hq,
            url: company.url,
            careers_url: company.careers_url,
            careers_urls: company.careers_urls,
            employees_est: company.employees_est,
            employees_est_source: company.employees_est_source,
            how_found: company.how_found,
            notes: company.notes,
            filed: company.filed.map(to_rfc3339),
            created_at: to_rfc3339(company.created_at),
            updated_at: to_rfc3339(company.updated_at),
            posting_count: None,
        }
    }
}

pub async fn list_companies(
    State(state): State<AppState>,
    Query(params): Query<CompanyListQuery>,
) -> AppResult<Json<Vec<CompanyResponse>>> {
    let mut conn = state.db()?;
    let (limit, offset) = page_bounds(params.limit, params.offset);

    let by_postings = match non_empty(params.order.as_deref()) {
        None | Some("name") => false,
        Some("postings") => true,
        Some(other) => {
            return Err(AppError::bad_request(format!(
                "invalid order '{other}', expected name or postings"
            )))
        }
    };

    let mut query = companies::table
        .left_join(postings::table)
        .group_by(companies::id)
        .select((companies::all_columns, count(postings::id.nullable())))
        .into_boxed();
    if let Some(search) = non_empty(params.query.as_deref()) {
        if let Ok(company_id) = Uuid::parse_str(search) {
            query = query.filter(companies::id.eq(company_id));
        } else {
            let pattern = format!("%{search}%");
            query = query.filter(
                companies::name
                    .ilike(pattern.clone())
                    .or(companies::url.ilike(pattern.clone()))
                    .or(companies::notes.ilike(pattern)),
            );
        }
    }
    if let Some(name) = non_empty(params.name.as_deref()) {
        query = query.filter(lower(companies::name).eq(name.to_lowercase()));
    }
    if let Some(priority) = params.priority {
        query = query.filter(companies::priority.eq(priority.as_i32()));
    }

    query = if by_postings {
        query.order((
            count(postings::id.nullable()).desc(),
            lower(companies::name).asc(),
            companies::id.asc(),
        ))
    } else {
        query.order((lower(companies::name).asc(), companies::id.asc()))
    };

    let rows: Vec<(Company, i64)> = query.limit(limit).offset(offset).load(&mut conn)?;

    let response = rows
        .into_iter()
        .map(|(company, posting_count)| CompanyResponse {
            posting_count: Some(posting_count),
            ..CompanyResponse::from(company)
        })
        .collect();

    Ok(Json(response))
}

pub async fn get_company(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
) -> AppResult<Json<CompanyResponse>> {
    let mut conn = state.db()?;
    let company = store::find(&mut conn, company_id)?;
    Ok(Json(company.into()))
}

pub async fn get_company_by_name(
    State(state): State<AppState>,
    Query(params): Query<CompanyNameQuery>,
) -> AppResult<Json<CompanyResponse>> {
    let mut conn = state.db()?;
    let company = store::find_by_name(&mut conn, params.name.trim())?
        .ok_or_else(AppError::not_found)?;
    Ok(Json(company.into()))
}

pub async fn create_company(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Json(payload): Json<CompanyRequest>,
) -> AppResult<(StatusCode, Json<CompanyResponse>)> {
    let filed = parse_datetime(payload.filed.as_deref().unwrap_or_default())
        .map_err(AppError::bad_request)?;
    let draft = CompanyDraft {
        name: payload.name,
        hq: payload.hq,
        url: payload.url,
        careers_url: payload.careers_url,
        careers_urls: validate_url_array(&payload.careers_urls)?,
        employees_est: payload.employees_est,
        employees_est_source: payload.employees_est_source,
        how_found: payload.how_found,
        priority: payload.priority,
        notes: payload.notes,
        filed,
    };
    let new_company = draft.validate()?;

    let mut conn = state.db()?;
    let company = store::create_company(&mut conn, &new_company)?;
    info!(company_id = %company.id, user_id = %user.user_id, "created company");
    Ok((StatusCode::CREATED, Json(company.into())))
}

pub async fn update_company(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Path(company_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<CompanyResponse>> {
    let text = |field: &'static str, max: usize| -> AppResult<Option<String>> {
        optional_string(&body, field)
            .map_err(AppError::bad_request)?
            .map(|value| limit_text(field, value.trim(), max))
            .transpose()
            .map_err(AppError::from)
    };

    let priority = match body.get("priority") {
        None => None,
        Some(value) => Some(
            serde_json::from_value::<Priority>(value.clone())
                .map_err(|_| AppError::bad_request(format!("invalid priority {value}")))?
                .as_i32(),
        ),
    };

    let changes = CompanyChangeset {
        name: optional_string(&body, "name")
            .map_err(AppError::bad_request)?
            .map(|value| require_text("name", &value, 500))
            .transpose()?,
        hq: text("hq", 250)?,
        url: optional_string(&body, "url")
            .map_err(AppError::bad_request)?
            .map(|value| require_url("url", &value))
            .transpose()?,
        careers_url: optional_string(&body, "careers_url")
            .map_err(AppError::bad_request)?
            .map(|value| require_url("careers_url", &value))
            .transpose()?,
        careers_urls: optional_url_array(&body, "careers_urls").map_err(AppError::bad_request)?,
        employees_est: text("employees_est", 100)?,
        employees_est_source: text("employees_est_source", 500)?,
        how_found: text("how_found", 250)?,
        priority,
        notes: optional_string(&body, "notes").map_err(AppError::bad_request)?,
        filed: nullable_datetime(&body, "filed").map_err(AppError::bad_request)?,
    };

    let mut conn = state.db()?;
    let company = store::update_company(&mut conn, company_id, &changes)?;
    info!(company_id = %company.id, user_id = %user.user_id, "updated company");
    Ok(Json(company.into()))
}

pub async fn delete_company(
    State(state): State<AppState>,
    StaffUser(user): StaffUser,
    Path(company_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    store::delete_company(&mut conn, company_id)?;
    info!(company_id = %company_id, user_id = %user.user_id, "deleted company");
    Ok(StatusCode::NO_CONTENT)
}
