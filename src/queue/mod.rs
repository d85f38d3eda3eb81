//! Per-user application queue.
//!
//! The queue functions return boxed diesel queries over `postings JOIN
//! companies` so that callers can add filters, pagination or a count before
//! anything touches the database.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use diesel::{
    dsl::{InnerJoin, IntoBoxed},
    pg::{Pg, PgConnection},
    prelude::*,
};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::{
    db::lower,
    models::{Company, Posting},
    schema::{applications, companies, postings},
    utils::non_empty,
};

pub mod rank;

pub use rank::{CompanyQueueCount, SLOTS_PER_COMPANY};

use rank::{capped_unapplied, count_by_company, Candidate};

/// Boxed query yielding `(Posting, Company)` rows.
pub type PostingRows<'a> = IntoBoxed<'a, InnerJoin<postings::table, companies::table>, Pg>;

pub fn postings_with_companies<'a>() -> PostingRows<'a> {
    postings::table.inner_join(companies::table).into_boxed()
}

/// Open postings the user has not applied to. When `ordered` is set the rows
/// come back by company priority, then company name ignoring case, then
/// posting id; leave it unset when the handle only feeds a count.
pub fn open_unapplied_postings<'a>(user_id: Uuid, ordered: bool) -> PostingRows<'a> {
    let applied = applications::table
        .filter(applications::user_id.eq(user_id))
        .select(applications::posting_id);

    let rows = postings_with_companies()
        .filter(postings::closed.is_null())
        .filter(postings::id.ne_all(applied));

    if ordered {
        rows.order((
            companies::priority.desc(),
            lower(companies::name).asc(),
            postings::id.asc(),
        ))
    } else {
        rows
    }
}

/// At most [`SLOTS_PER_COMPANY`] unapplied postings per company.
///
/// Each company's slots are filled from the postings the user applied to
/// (open or closed) and its open postings, ranked by [`rank::rank_order`].
/// Slots taken by applied postings are not returned, so a company the user
/// already applied to twice drops out of the queue entirely.
pub fn per_company_capped_queue<'a>(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> QueryResult<PostingRows<'a>> {
    let applied: Vec<Uuid> = applications::table
        .filter(applications::user_id.eq(user_id))
        .select(applications::posting_id)
        .load(conn)?;

    let rows: Vec<(Uuid, Uuid, bool, NaiveDateTime)> = postings::table
        .filter(
            postings::closed
                .is_null()
                .or(postings::id.eq_any(&applied)),
        )
        .select((
            postings::id,
            postings::company_id,
            postings::in_jurisdiction,
            postings::created_at,
        ))
        .load(conn)?;

    let applied: HashSet<Uuid> = applied.into_iter().collect();
    let candidates = rows
        .into_iter()
        .map(
            |(posting_id, company_id, in_jurisdiction, created_at)| Candidate {
                posting_id,
                company_id,
                has_application: applied.contains(&posting_id),
                in_jurisdiction,
                created_at,
            },
        );
    let posting_ids = capped_unapplied(candidates, SLOTS_PER_COMPANY);
    debug!(
        user_id = %user_id,
        postings = posting_ids.len(),
        "derived capped queue"
    );

    Ok(postings_with_companies()
        .filter(postings::id.eq_any(posting_ids))
        .order((
            companies::priority.desc(),
            lower(companies::name).asc(),
            postings::in_jurisdiction.desc(),
            postings::id.asc(),
        )))
}

/// Capped queue rolled up per company: priority first, then the number of
/// queued postings, then company name.
pub fn queue_counts_by_company(
    conn: &mut PgConnection,
    user_id: Uuid,
    filter: &QueueFilter,
) -> QueryResult<Vec<CompanyQueueCount>> {
    let rows: Vec<(Posting, Company)> =
        filter.apply(per_company_capped_queue(conn, user_id)?).load(conn)?;
    Ok(count_by_company(rows))
}

/// Optional narrowing applied on top of a queue handle.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct QueueFilter {
    /// Exact company name, ignoring case.
    pub company: Option<String>,
    pub in_jurisdiction: Option<bool>,
    /// Substring match over company name, posting title, URL and notes.
    pub query: Option<String>,
}

impl QueueFilter {
    pub fn apply<'a>(&self, mut rows: PostingRows<'a>) -> PostingRows<'a> {
        if let Some(company) = non_empty(self.company.as_deref()) {
            rows = rows.filter(lower(companies::name).eq(company.to_lowercase()));
        }

        if let Some(in_jurisdiction) = self.in_jurisdiction {
            rows = rows.filter(postings::in_jurisdiction.eq(in_jurisdiction));
        }

        if let Some(query) = non_empty(self.query.as_deref()) {
            let pattern = format!("%{query}%");
            rows = rows.filter(
                companies::name
                    .ilike(pattern.clone())
                    .or(postings::title.ilike(pattern.clone()))
                    .or(postings::url.ilike(pattern.clone()))
                    .or(postings::notes.ilike(pattern)),
            );
        }

        rows
    }
}
