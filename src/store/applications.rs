use chrono::{NaiveDateTime, Utc};
use diesel::{dsl::count_star, pg::PgConnection, prelude::*};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::{StoreError, StoreResult};
use crate::{
    models::{Application, NewApplication},
    schema::{applications, postings},
};

const DUPLICATE_APPLICATION: &str = "an application for this posting already exists";

#[derive(AsChangeset, Debug, Default, Clone)]
#[diesel(table_name = applications)]
pub struct ApplicationChangeset {
    pub posting_id: Option<Uuid>,
    pub bona_fide: Option<Option<i32>>,
    pub applied: Option<NaiveDateTime>,
    pub reported: Option<Option<NaiveDateTime>>,
    pub notes: Option<String>,
}

impl ApplicationChangeset {
    pub fn is_empty(&self) -> bool {
        self.posting_id.is_none()
            && self.bona_fide.is_none()
            && self.applied.is_none()
            && self.reported.is_none()
            && self.notes.is_none()
    }
}

/// Fields of a new application. `applied` defaults to the time of insert.
#[derive(Debug, Clone, Default)]
pub struct ApplicationDraft {
    pub user_id: Uuid,
    pub posting_id: Uuid,
    pub bona_fide: Option<i32>,
    pub applied: Option<NaiveDateTime>,
    pub reported: Option<NaiveDateTime>,
    pub notes: String,
}

impl ApplicationDraft {
    pub fn into_new(self) -> NewApplication {
        NewApplication {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            posting_id: self.posting_id,
            bona_fide: self.bona_fide,
            applied: self.applied.unwrap_or_else(|| Utc::now().naive_utc()),
            reported: self.reported,
            notes: self.notes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MarkAppliedSummary {
    pub created: usize,
    pub skipped: usize,
}

/// Owner-scoped lookup: an application that exists but belongs to someone
/// else reads as not found.
pub fn find_for_user(
    conn: &mut PgConnection,
    user_id: Uuid,
    application_id: Uuid,
) -> QueryResult<Application> {
    applications::table
        .filter(applications::id.eq(application_id))
        .filter(applications::user_id.eq(user_id))
        .first(conn)
}

pub fn find_by_user_and_posting(
    conn: &mut PgConnection,
    user_id: Uuid,
    posting_id: Uuid,
) -> QueryResult<Option<Application>> {
    applications::table
        .filter(applications::user_id.eq(user_id))
        .filter(applications::posting_id.eq(posting_id))
        .first(conn)
        .optional()
}

/// Inserts one application. A second application for the same user and
/// posting is rejected by the unique constraint and reported as a conflict;
/// the existing row is left untouched.
pub fn create_application(
    conn: &mut PgConnection,
    draft: ApplicationDraft,
) -> StoreResult<Application> {
    let new_application = draft.into_new();
    diesel::insert_into(applications::table)
        .values(&new_application)
        .get_result(conn)
        .map_err(|err| StoreError::on_unique_violation(err, DUPLICATE_APPLICATION))
}

pub fn update_application(
    conn: &mut PgConnection,
    user_id: Uuid,
    application_id: Uuid,
    changes: &ApplicationChangeset,
) -> StoreResult<Application> {
    let existing = find_for_user(conn, user_id, application_id)?;
    if changes.is_empty() {
        return Ok(existing);
    }

    diesel::update(applications::table.find(application_id))
        .set(changes)
        .get_result(conn)
        .map_err(|err| StoreError::on_unique_violation(err, DUPLICATE_APPLICATION))
}

pub fn delete_application(
    conn: &mut PgConnection,
    user_id: Uuid,
    application_id: Uuid,
) -> StoreResult<()> {
    let deleted = diesel::delete(
        applications::table
            .filter(applications::id.eq(application_id))
            .filter(applications::user_id.eq(user_id)),
    )
    .execute(conn)?;
    if deleted == 0 {
        return Err(StoreError::Database(diesel::result::Error::NotFound));
    }
    Ok(())
}

/// Records an application for every posting in `posting_ids`. Postings the
/// user already applied to are skipped silently and counted in `skipped`.
pub fn mark_applied(
    conn: &mut PgConnection,
    user_id: Uuid,
    posting_ids: &[Uuid],
) -> StoreResult<MarkAppliedSummary> {
    let mut unique_ids = posting_ids.to_vec();
    unique_ids.sort();
    unique_ids.dedup();
    if unique_ids.is_empty() {
        return Ok(MarkAppliedSummary {
            created: 0,
            skipped: 0,
        });
    }

    let existing: i64 = postings::table
        .filter(postings::id.eq_any(&unique_ids))
        .select(count_star())
        .first(conn)?;
    if existing as usize != unique_ids.len() {
        return Err(StoreError::Conflict(
            "one or more postings do not exist".to_string(),
        ));
    }

    let now = Utc::now().naive_utc();
    let rows: Vec<NewApplication> = unique_ids
        .iter()
        .map(|posting_id| {
            ApplicationDraft {
                user_id,
                posting_id: *posting_id,
                applied: Some(now),
                ..Default::default()
            }
            .into_new()
        })
        .collect();

    let created = diesel::insert_into(applications::table)
        .values(&rows)
        .on_conflict((applications::user_id, applications::posting_id))
        .do_nothing()
        .execute(conn)?;

    let summary = MarkAppliedSummary {
        created,
        skipped: unique_ids.len() - created,
    };
    info!(
        user_id = %user_id,
        created = summary.created,
        skipped = summary.skipped,
        "marked postings as applied"
    );
    Ok(summary)
}
