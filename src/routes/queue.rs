use axum::{
    extract::{Query, State},
    Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{page_bounds, postings::PostingResponse};
use crate::{
    auth::AuthenticatedUser,
    error::AppResult,
    models::{Company, Posting, Priority},
    queue::{
        open_unapplied_postings, per_company_capped_queue, queue_counts_by_company,
        CompanyQueueCount, QueueFilter,
    },
    state::AppState,
};

#[derive(Deserialize, Default)]
pub struct QueueQuery {
    /// Limit each company to its top ranked postings.
    #[serde(default)]
    pub capped: bool,
    pub company: Option<String>,
    pub in_jurisdiction: Option<bool>,
    pub query: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl QueueQuery {
    fn filter(&self) -> QueueFilter {
        QueueFilter {
            company: self.company.clone(),
            in_jurisdiction: self.in_jurisdiction,
            query: self.query.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct QueueCompanyResponse {
    pub company_id: Uuid,
    pub name: String,
    pub priority: Priority,
    pub count: i64,
    pub count_in_jurisdiction: i64,
}

impl From<CompanyQueueCount> for QueueCompanyResponse {
    fn from(entry: CompanyQueueCount) -> Self {
        Self {
            priority: entry.company.priority(),
            company_id: entry.company.id,
            name: entry.company.name,
            count: entry.count,
            count_in_jurisdiction: entry.count_in_jurisdiction,
        }
    }
}

pub async fn list_queue(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<QueueQuery>,
) -> AppResult<Json<Vec<PostingResponse>>> {
    let mut conn = state.db()?;
    let (limit, offset) = page_bounds(params.limit, params.offset);

    let rows = if params.capped {
        per_company_capped_queue(&mut conn, user.user_id)?
    } else {
        open_unapplied_postings(user.user_id, true)
    };
    let rows: Vec<(Posting, Company)> = params
        .filter()
        .apply(rows)
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|(posting, company)| PostingResponse::with_company(posting, company))
            .collect(),
    ))
}

pub async fn list_queue_companies(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<QueueQuery>,
) -> AppResult<Json<Vec<QueueCompanyResponse>>> {
    let mut conn = state.db()?;
    let counts = queue_counts_by_company(&mut conn, user.user_id, &params.filter())?;
    Ok(Json(counts.into_iter().map(QueueCompanyResponse::from).collect()))
}
