use std::collections::HashSet;

use chrono::{NaiveDateTime, Utc};
use diesel::{dsl::count_star, pg::PgConnection, prelude::*};
use uuid::Uuid;

use super::{StoreError, StoreResult};
use crate::{
    models::{NewPosting, Posting},
    schema::{applications, postings},
    validation::{
        limit_text, normalize_posting_url, require_text, require_url, validate_url_list,
        ValidationError, ValidationResult,
    },
};

/// Unvalidated posting fields. URLs are normalized during validation.
#[derive(Debug, Clone, Default)]
pub struct PostingDraft {
    pub company_id: Uuid,
    pub url: String,
    pub job_board_urls: Vec<String>,
    pub title: String,
    pub closed: Option<NaiveDateTime>,
    pub closed_note: String,
    pub location: String,
    pub in_jurisdiction: bool,
    pub jurisdiction: String,
    pub notes: String,
}

impl PostingDraft {
    pub fn validate(self) -> ValidationResult<NewPosting> {
        let job_board_urls: Vec<String> = self
            .job_board_urls
            .iter()
            .map(|url| normalize_posting_url(url))
            .filter(|url| !url.is_empty())
            .collect();

        Ok(NewPosting {
            id: Uuid::new_v4(),
            company_id: self.company_id,
            url: require_url("url", &normalize_posting_url(&self.url))?,
            job_board_urls: validate_url_list(job_board_urls.iter().map(String::as_str))?,
            title: require_text("title", &self.title, 500)?,
            closed: self.closed,
            closed_note: limit_text("closed_note", self.closed_note.trim(), 1000)?,
            location: limit_text("location", self.location.trim(), 500)?,
            in_jurisdiction: self.in_jurisdiction,
            jurisdiction: limit_text("jurisdiction", self.jurisdiction.trim(), 2000)?,
            notes: self.notes,
        })
    }
}

#[derive(AsChangeset, Debug, Default, Clone)]
#[diesel(table_name = postings)]
pub struct PostingChangeset {
    pub company_id: Option<Uuid>,
    pub url: Option<String>,
    pub job_board_urls: Option<Vec<String>>,
    pub title: Option<String>,
    pub closed: Option<Option<NaiveDateTime>>,
    pub closed_note: Option<String>,
    pub location: Option<String>,
    pub in_jurisdiction: Option<bool>,
    pub jurisdiction: Option<String>,
    pub notes: Option<String>,
}

impl PostingChangeset {
    pub fn is_empty(&self) -> bool {
        self.company_id.is_none()
            && self.url.is_none()
            && self.job_board_urls.is_none()
            && self.title.is_none()
            && self.closed.is_none()
            && self.closed_note.is_none()
            && self.location.is_none()
            && self.in_jurisdiction.is_none()
            && self.jurisdiction.is_none()
            && self.notes.is_none()
    }

    pub fn replacing_with(new: NewPosting) -> Self {
        Self {
            company_id: Some(new.company_id),
            url: Some(new.url),
            job_board_urls: Some(new.job_board_urls),
            title: Some(new.title),
            closed: Some(new.closed),
            closed_note: Some(new.closed_note),
            location: Some(new.location),
            in_jurisdiction: Some(new.in_jurisdiction),
            jurisdiction: Some(new.jurisdiction),
            notes: Some(new.notes),
        }
    }
}

pub fn find(conn: &mut PgConnection, posting_id: Uuid) -> QueryResult<Posting> {
    postings::table.find(posting_id).first(conn)
}

/// Postings whose canonical URL or any job board URL equals `url`.
pub fn find_by_url(conn: &mut PgConnection, url: &str) -> QueryResult<Vec<Posting>> {
    postings::table
        .filter(
            postings::url
                .eq(url)
                .or(postings::job_board_urls.contains(vec![url.to_string()])),
        )
        .order(postings::created_at.asc())
        .load(conn)
}

/// Rejects a URL set that repeats itself or collides with the canonical or
/// job board URLs of any other posting. `exclude` is the posting being
/// updated, if any.
pub fn ensure_unique_urls(
    conn: &mut PgConnection,
    urls: &[&str],
    exclude: Option<Uuid>,
) -> StoreResult<()> {
    let mut seen = HashSet::with_capacity(urls.len());
    for url in urls {
        if !seen.insert(*url) {
            return Err(ValidationError::DuplicateUrl(url.to_string()).into());
        }
    }

    for url in urls {
        let mut query = postings::table
            .filter(
                postings::url
                    .eq(*url)
                    .or(postings::job_board_urls.contains(vec![url.to_string()])),
            )
            .select(count_star())
            .into_boxed();
        if let Some(posting_id) = exclude {
            query = query.filter(postings::id.ne(posting_id));
        }

        let matches: i64 = query.first(conn)?;
        if matches > 0 {
            return Err(ValidationError::DuplicateUrl(url.to_string()).into());
        }
    }

    Ok(())
}

/// Canonical URL followed by every job board URL.
fn posting_urls<'a>(url: &'a str, job_board_urls: &'a [String]) -> Vec<&'a str> {
    std::iter::once(url)
        .chain(job_board_urls.iter().map(String::as_str))
        .collect()
}

pub fn create_posting(conn: &mut PgConnection, new_posting: &NewPosting) -> StoreResult<Posting> {
    conn.transaction(|conn| {
        let urls = posting_urls(&new_posting.url, &new_posting.job_board_urls);
        ensure_unique_urls(conn, &urls, None)?;

        diesel::insert_into(postings::table)
            .values(new_posting)
            .get_result(conn)
            .map_err(|err| {
                StoreError::on_unique_violation(
                    err,
                    ValidationError::DuplicateUrl(new_posting.url.clone()).to_string(),
                )
            })
    })
}

pub fn update_posting(
    conn: &mut PgConnection,
    posting_id: Uuid,
    changes: &PostingChangeset,
) -> StoreResult<Posting> {
    conn.transaction(|conn| {
        let existing = find(conn, posting_id)?;
        if changes.is_empty() {
            return Ok(existing);
        }

        if changes.url.is_some() || changes.job_board_urls.is_some() {
            let url = changes.url.as_deref().unwrap_or(&existing.url);
            let job_board_urls = changes
                .job_board_urls
                .as_ref()
                .unwrap_or(&existing.job_board_urls);
            let urls = posting_urls(url, job_board_urls);
            ensure_unique_urls(conn, &urls, Some(posting_id))?;
        }

        let now = Utc::now().naive_utc();
        diesel::update(postings::table.find(posting_id))
            .set((changes, postings::updated_at.eq(now)))
            .get_result(conn)
            .map_err(|err| StoreError::on_unique_violation(err, "posting URL already exists"))
    })
}

/// Marks a posting closed now. Already-closed postings keep their original
/// timestamp but take the new note when one is given.
pub fn close_posting(
    conn: &mut PgConnection,
    posting_id: Uuid,
    note: Option<&str>,
) -> StoreResult<Posting> {
    let existing = find(conn, posting_id)?;
    let now = Utc::now().naive_utc();
    let changes = PostingChangeset {
        closed: Some(Some(existing.closed.unwrap_or(now))),
        closed_note: note.map(|value| value.trim().to_string()),
        ..Default::default()
    };
    update_posting(conn, posting_id, &changes)
}

pub fn delete_posting(conn: &mut PgConnection, posting_id: Uuid) -> StoreResult<()> {
    let application_count: i64 = applications::table
        .filter(applications::posting_id.eq(posting_id))
        .select(count_star())
        .first(conn)?;

    if application_count > 0 {
        return Err(StoreError::InUse(
            "cannot delete posting that still has applications".to_string(),
        ));
    }

    let deleted = diesel::delete(postings::table.find(posting_id)).execute(conn)?;
    if deleted == 0 {
        return Err(StoreError::Database(diesel::result::Error::NotFound));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::posting_urls;

    #[test]
    fn canonical_url_leads_the_url_set() {
        let boards = vec![
            "https://boards.example/initech/1".to_string(),
            "https://boards.example/initech/2".to_string(),
        ];
        assert_eq!(
            posting_urls("https://initech.example/jobs/1", &boards),
            vec![
                "https://initech.example/jobs/1",
                "https://boards.example/initech/1",
                "https://boards.example/initech/2",
            ]
        );
        assert_eq!(
            posting_urls("https://initech.example/jobs/1", &[]),
            vec!["https://initech.example/jobs/1"]
        );
    }
}
