//! CSV export and import.
//!
//! Exports leave out surrogate keys and replace foreign keys with natural
//! ones (`company_name`, `username`, `posting_url`). Imports are upserts on
//! those natural keys and run inside a single transaction, so a bad row
//! rolls back the whole file.

use std::io::Read;

use chrono::NaiveDateTime;
use diesel::{pg::PgConnection, prelude::*};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::{
    db::lower,
    error::AppError,
    models::{Application, BonaFide, Company, Posting, Priority, User},
    schema::{applications, companies, postings, users},
    store::{
        applications::{
            create_application, find_by_user_and_posting, update_application,
            ApplicationChangeset, ApplicationDraft,
        },
        companies::{self as company_store, CompanyChangeset, CompanyDraft},
        postings::{self as posting_store, PostingChangeset, PostingDraft},
        users::find_by_username,
        StoreError,
    },
    utils::time::{format_datetime, parse_datetime},
    validation::{normalize_posting_url, validate_url_array, ValidationError},
};

/// Excluded from the users export.
const RESERVED_USERNAME: &str = "admin";

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("invalid CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to write CSV: {0}")]
    Io(#[from] std::io::Error),
    #[error("row {row}: {message}")]
    Row { row: usize, message: String },
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl TransferError {
    fn row(row: usize, message: impl ToString) -> Self {
        TransferError::Row {
            row,
            message: message.to_string(),
        }
    }
}

impl From<TransferError> for AppError {
    fn from(value: TransferError) -> Self {
        match value {
            TransferError::Database(err) => AppError::from(err),
            TransferError::Io(err) => AppError::internal(err),
            other => AppError::bad_request(other.to_string()),
        }
    }
}

pub type TransferResult<T> = Result<T, TransferError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub name: String,
    #[serde(default)]
    pub hq: String,
    pub url: String,
    pub careers_url: String,
    #[serde(default)]
    pub careers_urls: String,
    #[serde(default)]
    pub employees_est: String,
    #[serde(default)]
    pub employees_est_source: String,
    #[serde(default)]
    pub how_found: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub filed: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostingRecord {
    pub company_name: String,
    pub url: String,
    #[serde(default)]
    pub job_board_urls: String,
    pub title: String,
    #[serde(default)]
    pub closed: String,
    #[serde(default)]
    pub closed_note: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub in_jurisdiction: String,
    #[serde(default)]
    pub jurisdiction: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApplicationRecord {
    #[serde(default)]
    pub username: String,
    pub posting_url: String,
    #[serde(default)]
    pub bona_fide: String,
    #[serde(default)]
    pub applied: String,
    #[serde(default)]
    pub reported: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Serialize)]
pub struct UserRecord {
    pub username: String,
    pub role: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub linkedin: String,
    pub created_at: String,
}

fn format_optional(value: Option<NaiveDateTime>) -> String {
    value.map(format_datetime).unwrap_or_default()
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "0" | "no" => Ok(false),
        "true" | "1" | "yes" => Ok(true),
        other => Err(format!("invalid boolean '{other}'")),
    }
}

/// URL arrays travel as JSON text inside a single CSV cell.
fn parse_url_array(value: &str) -> Result<Vec<String>, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let parsed: serde_json::Value =
        serde_json::from_str(trimmed).map_err(|_| ValidationError::InvalidList)?;
    validate_url_array(&parsed)
}

fn format_url_array(urls: &[String]) -> String {
    if urls.is_empty() {
        return String::new();
    }
    serde_json::Value::from(urls.to_vec()).to_string()
}

fn write_records<T: Serialize>(records: impl IntoIterator<Item = T>) -> TransferResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(record)?;
    }
    writer.into_inner().map_err(|err| err.into_error().into())
}

fn read_records<T, R>(reader: R) -> TransferResult<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
    R: Read,
{
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut records = Vec::new();
    for (index, record) in csv_reader.deserialize::<T>().enumerate() {
        records.push(record.map_err(|err| TransferError::row(index + 1, err))?);
    }
    Ok(records)
}

fn store_error(row: usize, err: StoreError) -> TransferError {
    match err {
        StoreError::Database(err) => TransferError::Database(err),
        other => TransferError::row(row, other),
    }
}

impl From<&Company> for CompanyRecord {
    fn from(company: &Company) -> Self {
        Self {
            name: company.name.clone(),
            hq: company.hq.clone(),
            url: company.url.clone(),
            careers_url: company.careers_url.clone(),
            careers_urls: format_url_array(&company.careers_urls),
            employees_est: company.employees_est.clone(),
            employees_est_source: company.employees_est_source.clone(),
            how_found: company.how_found.clone(),
            priority: company.priority().label().to_string(),
            notes: company.notes.clone(),
            filed: format_optional(company.filed),
            created_at: format_datetime(company.created_at),
            updated_at: format_datetime(company.updated_at),
        }
    }
}

impl CompanyRecord {
    fn into_draft(self) -> Result<CompanyDraft, String> {
        let priority = if self.priority.trim().is_empty() {
            Priority::default()
        } else {
            Priority::parse(&self.priority)
                .ok_or_else(|| format!("invalid priority '{}'", self.priority))?
        };
        Ok(CompanyDraft {
            name: self.name,
            hq: self.hq,
            url: self.url,
            careers_url: self.careers_url,
            careers_urls: parse_url_array(&self.careers_urls).map_err(|err| err.to_string())?,
            employees_est: self.employees_est,
            employees_est_source: self.employees_est_source,
            how_found: self.how_found,
            priority,
            notes: self.notes,
            filed: parse_datetime(&self.filed)?,
        })
    }
}

pub fn export_companies(conn: &mut PgConnection) -> TransferResult<Vec<u8>> {
    let rows: Vec<Company> = companies::table
        .order(lower(companies::name).asc())
        .load(conn)?;
    write_records(rows.iter().map(CompanyRecord::from))
}

pub fn import_companies<R: Read>(conn: &mut PgConnection, reader: R) -> TransferResult<ImportSummary> {
    let records: Vec<CompanyRecord> = read_records(reader)?;
    conn.transaction::<_, TransferError, _>(|conn| {
        let mut summary = ImportSummary::default();
        for (index, record) in records.into_iter().enumerate() {
            let row = index + 1;
            let new_company = record
                .into_draft()
                .map_err(|message| TransferError::row(row, message))?
                .validate()
                .map_err(|err| TransferError::row(row, err))?;

            match company_store::find_by_name(conn, &new_company.name)? {
                Some(existing) => {
                    let changes = CompanyChangeset::replacing_with(new_company);
                    company_store::update_company(conn, existing.id, &changes)
                        .map_err(|err| store_error(row, err))?;
                    summary.updated += 1;
                }
                None => {
                    company_store::create_company(conn, &new_company)
                        .map_err(|err| store_error(row, err))?;
                    summary.created += 1;
                }
            }
        }
        info!(
            created = summary.created,
            updated = summary.updated,
            "imported companies"
        );
        Ok(summary)
    })
}

fn posting_record(posting: &Posting, company_name: &str) -> PostingRecord {
    PostingRecord {
        company_name: company_name.to_string(),
        url: posting.url.clone(),
        job_board_urls: format_url_array(&posting.job_board_urls),
        title: posting.title.clone(),
        closed: format_optional(posting.closed),
        closed_note: posting.closed_note.clone(),
        location: posting.location.clone(),
        in_jurisdiction: posting.in_jurisdiction.to_string(),
        jurisdiction: posting.jurisdiction.clone(),
        notes: posting.notes.clone(),
        created_at: format_datetime(posting.created_at),
        updated_at: format_datetime(posting.updated_at),
    }
}

pub fn export_postings(conn: &mut PgConnection) -> TransferResult<Vec<u8>> {
    let rows: Vec<(Posting, Company)> = postings::table
        .inner_join(companies::table)
        .order((lower(companies::name).asc(), postings::url.asc()))
        .load(conn)?;
    write_records(
        rows.iter()
            .map(|(posting, company)| posting_record(posting, &company.name)),
    )
}

pub fn import_postings<R: Read>(conn: &mut PgConnection, reader: R) -> TransferResult<ImportSummary> {
    let records: Vec<PostingRecord> = read_records(reader)?;
    conn.transaction::<_, TransferError, _>(|conn| {
        let mut summary = ImportSummary::default();
        for (index, record) in records.into_iter().enumerate() {
            let row = index + 1;
            let company = company_store::find_by_name(conn, record.company_name.trim())?
                .ok_or_else(|| {
                    TransferError::row(row, format!("unknown company '{}'", record.company_name))
                })?;

            let draft = PostingDraft {
                company_id: company.id,
                url: record.url,
                job_board_urls: parse_url_array(&record.job_board_urls)
                    .map_err(|err| TransferError::row(row, err))?,
                title: record.title,
                closed: parse_datetime(&record.closed)
                    .map_err(|message| TransferError::row(row, message))?,
                closed_note: record.closed_note,
                location: record.location,
                in_jurisdiction: parse_bool(&record.in_jurisdiction)
                    .map_err(|message| TransferError::row(row, message))?,
                jurisdiction: record.jurisdiction,
                notes: record.notes,
            };
            let new_posting = draft.validate().map_err(|err| TransferError::row(row, err))?;

            let existing: Option<Posting> = postings::table
                .filter(postings::url.eq(&new_posting.url))
                .first(conn)
                .optional()?;
            match existing {
                Some(existing) => {
                    let changes = PostingChangeset::replacing_with(new_posting);
                    posting_store::update_posting(conn, existing.id, &changes)
                        .map_err(|err| store_error(row, err))?;
                    summary.updated += 1;
                }
                None => {
                    posting_store::create_posting(conn, &new_posting)
                        .map_err(|err| store_error(row, err))?;
                    summary.created += 1;
                }
            }
        }
        info!(
            created = summary.created,
            updated = summary.updated,
            "imported postings"
        );
        Ok(summary)
    })
}

/// Exports applications, limited to one user when `user_id` is given.
pub fn export_applications(
    conn: &mut PgConnection,
    user_id: Option<Uuid>,
) -> TransferResult<Vec<u8>> {
    let mut query = applications::table
        .inner_join(users::table)
        .inner_join(postings::table)
        .select((
            applications::all_columns,
            users::username,
            postings::url,
        ))
        .order((users::username.asc(), applications::applied.asc()))
        .into_boxed();
    if let Some(user_id) = user_id {
        query = query.filter(applications::user_id.eq(user_id));
    }
    let rows: Vec<(Application, String, String)> = query.load(conn)?;

    write_records(
        rows.into_iter()
            .map(|(application, username, posting_url)| ApplicationRecord {
                username,
                posting_url,
                bona_fide: application
                    .bona_fide()
                    .map(|rating| rating.label().to_string())
                    .unwrap_or_default(),
                applied: format_datetime(application.applied),
                reported: format_optional(application.reported),
                notes: application.notes,
            }),
    )
}

/// Imports applications keyed by (user, posting URL). With `owner` set every
/// row is attributed to that user and the `username` column is ignored.
pub fn import_applications<R: Read>(
    conn: &mut PgConnection,
    reader: R,
    owner: Option<Uuid>,
) -> TransferResult<ImportSummary> {
    let records: Vec<ApplicationRecord> = read_records(reader)?;
    conn.transaction::<_, TransferError, _>(|conn| {
        let mut summary = ImportSummary::default();
        for (index, record) in records.into_iter().enumerate() {
            let row = index + 1;
            let user_id = match owner {
                Some(user_id) => user_id,
                None => {
                    find_by_username(conn, record.username.trim())?
                        .ok_or_else(|| {
                            TransferError::row(row, format!("unknown user '{}'", record.username))
                        })?
                        .id
                }
            };

            let posting_url = normalize_posting_url(&record.posting_url);
            let posting_id: Uuid = postings::table
                .filter(postings::url.eq(&posting_url))
                .select(postings::id)
                .first(conn)
                .optional()?
                .ok_or_else(|| {
                    TransferError::row(row, format!("unknown posting '{}'", record.posting_url))
                })?;

            let bona_fide = if record.bona_fide.trim().is_empty() {
                None
            } else {
                Some(
                    BonaFide::parse(&record.bona_fide)
                        .ok_or_else(|| {
                            TransferError::row(
                                row,
                                format!("invalid bona_fide '{}'", record.bona_fide),
                            )
                        })?
                        .as_i32(),
                )
            };
            let applied =
                parse_datetime(&record.applied).map_err(|message| TransferError::row(row, message))?;
            let reported = parse_datetime(&record.reported)
                .map_err(|message| TransferError::row(row, message))?;

            match find_by_user_and_posting(conn, user_id, posting_id)? {
                Some(existing) => {
                    let changes = ApplicationChangeset {
                        bona_fide: Some(bona_fide),
                        applied,
                        reported: Some(reported),
                        notes: Some(record.notes),
                        ..Default::default()
                    };
                    update_application(conn, user_id, existing.id, &changes)
                        .map_err(|err| store_error(row, err))?;
                    summary.updated += 1;
                }
                None => {
                    let draft = ApplicationDraft {
                        user_id,
                        posting_id,
                        bona_fide,
                        applied,
                        reported,
                        notes: record.notes,
                    };
                    create_application(conn, draft).map_err(|err| store_error(row, err))?;
                    summary.created += 1;
                }
            }
        }
        info!(
            created = summary.created,
            updated = summary.updated,
            owner = ?owner,
            "imported applications"
        );
        Ok(summary)
    })
}

pub fn export_users(conn: &mut PgConnection) -> TransferResult<Vec<u8>> {
    let rows: Vec<User> = users::table
        .filter(users::username.ne(RESERVED_USERNAME))
        .order(users::username.asc())
        .load(conn)?;
    write_records(rows.into_iter().map(|user| UserRecord {
        username: user.username,
        role: user.role,
        first_name: user.first_name,
        last_name: user.last_name,
        email: user.email,
        phone: user.phone,
        linkedin: user.linkedin,
        created_at: format_datetime(user.created_at),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_array_cells_are_json() {
        let urls = vec!["https://example.com/jobs/1".to_string()];
        let cell = format_url_array(&urls);
        assert_eq!(parse_url_array(&cell).unwrap(), urls);
        assert_eq!(parse_url_array("").unwrap(), Vec::<String>::new());
        assert_eq!(
            parse_url_array("\"https://example.com\""),
            Err(ValidationError::InvalidList)
        );
        assert_eq!(
            parse_url_array("[\"not a url\"]"),
            Err(ValidationError::InvalidUrls)
        );
    }

    #[test]
    fn company_rows_reject_unknown_priority() {
        let record = CompanyRecord {
            name: "Initech".into(),
            hq: String::new(),
            url: "https://initech.example".into(),
            careers_url: "https://initech.example/careers".into(),
            careers_urls: String::new(),
            employees_est: String::new(),
            employees_est_source: String::new(),
            how_found: String::new(),
            priority: "urgent".into(),
            notes: String::new(),
            filed: String::new(),
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert!(record.into_draft().is_err());
    }

    #[test]
    fn reads_rows_with_missing_optional_columns() {
        let data = "username,posting_url\nsolo,https://jobs.example/1\n";
        let records: Vec<ApplicationRecord> = read_records(data.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].username, "solo");
        assert!(records[0].bona_fide.is_empty());
    }

    #[test]
    fn booleans_accept_common_spellings() {
        assert_eq!(parse_bool("TRUE"), Ok(true));
        assert_eq!(parse_bool(""), Ok(false));
        assert!(parse_bool("maybe").is_err());
    }
}
